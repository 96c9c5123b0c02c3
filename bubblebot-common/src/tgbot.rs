use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::warn;
use reqwest::Url;
use teloxide::adaptors::throttle::Throttle;
use teloxide::adaptors::CacheMe;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::payloads::{
    EditMessageTextSetters, SendDocumentSetters, SendMessageSetters, SendPhotoSetters,
};
use teloxide::prelude::{
    dptree, CallbackQuery, ChatId, Dispatcher, Message, Requester, Update, UserId,
};
use teloxide::types::{
    InlineKeyboardMarkup, InputFile, LinkPreviewOptions, MessageId, ParseMode, ReplyMarkup,
};
use teloxide::{ApiError, Bot, RequestError};

use crate::app::AppState;
use crate::bot_commands::{MessageCommand, TgCommand};

pub type TgBot = CacheMe<Throttle<Bot>>;

pub struct BotData {
    bot: TgBot,
    bot_id: UserId,
    app: Arc<AppState>,
    // Callback payloads must stay under Telegram's 64-byte limit, so commands
    // are stored here and referenced by a short generated id. In-memory only:
    // a restart invalidates old keyboards, which the handler reports as
    // "cannot be restored".
    callback_data_cache: DashMap<String, String>,
    next_callback_id: AtomicU64,
    dm_message_commands: DashMap<UserId, MessageCommand>,
}

impl BotData {
    pub async fn new(bot: TgBot, app: Arc<AppState>) -> Result<Self, anyhow::Error> {
        let bot_id = bot.get_me().await?.id;
        Ok(Self {
            bot,
            bot_id,
            app,
            callback_data_cache: DashMap::new(),
            next_callback_id: AtomicU64::new(0),
            dm_message_commands: DashMap::new(),
        })
    }

    pub async fn start_polling(&self) -> Result<(), anyhow::Error> {
        let bot = self.bot.clone();
        let (msg_sender, mut msg_receiver) = tokio::sync::mpsc::channel(1000);
        let (callback_query_sender, mut callback_query_receiver) = tokio::sync::mpsc::channel(1000);

        tokio::spawn(async move {
            let handler = dptree::entry()
                .branch(Update::filter_message().endpoint(move |msg: Message| {
                    let msg_sender = msg_sender.clone();
                    async move {
                        msg_sender.send(msg).await.unwrap();
                        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                    }
                }))
                .branch(Update::filter_callback_query().endpoint(
                    move |callback_query: CallbackQuery| {
                        let callback_query_sender = callback_query_sender.clone();
                        async move {
                            callback_query_sender.send(callback_query).await.unwrap();
                            Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                        }
                    },
                ));
            Dispatcher::builder(bot, handler).build().dispatch().await;
        });

        let me = self.id();
        let app = Arc::clone(&self.app);
        tokio::spawn(async move {
            while let Some(msg) = msg_receiver.recv().await {
                let app = Arc::clone(&app);
                tokio::spawn(async move {
                    let text = msg.text().or(msg.caption()).unwrap_or_default();
                    let user_id = msg.from.as_ref().map(|user| user.id).or_else(|| {
                        msg.chat
                            .id
                            .is_user()
                            .then(|| UserId(msg.chat.id.0 as u64))
                    });
                    for module in app.bot_modules().await.iter() {
                        let bot = app.bot(&me).unwrap();
                        let command = if text == "/start" {
                            MessageCommand::Start(String::new())
                        } else if let Some(data) = text.strip_prefix("/start ") {
                            MessageCommand::Start(data.to_string())
                        } else if let Some(user_id) =
                            user_id.filter(|_| msg.chat.id.is_user())
                        {
                            bot.get_dm_message_command(&user_id)
                                .unwrap_or(MessageCommand::None)
                        } else {
                            MessageCommand::None
                        };
                        log::debug!(
                            "chat={:?} ({command:?}): {text}, module: {}",
                            msg.chat.id,
                            module.name()
                        );
                        if let Err(err) = module
                            .handle_message(&bot, user_id, msg.chat.id, command, text, &msg)
                            .await
                        {
                            warn!(
                                "Error handling message {} in module {}: {:?}",
                                text,
                                module.name(),
                                err
                            );
                        }
                    }
                });
            }
        });
        let app = Arc::clone(&self.app);
        tokio::spawn(async move {
            while let Some(callback_query) = callback_query_receiver.recv().await {
                let app = Arc::clone(&app);
                tokio::spawn(async move {
                    if let (Some(data), Some(message)) =
                        (callback_query.data, callback_query.message)
                    {
                        for module in app.bot_modules().await.iter() {
                            let bot = app.bot(&me).unwrap();
                            let context = TgCallbackContext::new(
                                bot.value(),
                                callback_query.from.id,
                                message.chat().id,
                                Some(message.id()),
                                &data,
                            );
                            log::debug!("Callback data: {data}, module: {}", module.name());
                            let mut query = Some(MustAnswerCallbackQuery {
                                bot_id: me,
                                callback_query: callback_query.id.clone(),
                                callback_query_answered: false,
                            });
                            if let Err(err) = module.handle_callback(context, &mut query).await {
                                warn!(
                                    "Error handling callback data {} in module {}: {:?}",
                                    data,
                                    module.name(),
                                    err
                                );
                            }
                            if let Some(query) = query {
                                query.answer_callback_query(&app).await;
                            }
                        }
                    }
                });
            }
        });
        Ok(())
    }

    pub fn bot(&self) -> &TgBot {
        &self.bot
    }

    pub fn app(&self) -> &Arc<AppState> {
        &self.app
    }

    pub fn id(&self) -> UserId {
        self.bot_id
    }

    pub fn to_callback_data(&self, data: &TgCommand) -> String {
        let data = serde_json::to_string(data).expect("Error serializing callback data");
        let reference = format!("b{}", self.next_callback_id.fetch_add(1, Ordering::Relaxed));
        self.callback_data_cache.insert(reference.clone(), data);
        reference
    }

    pub fn parse_callback_data(&self, reference: &str) -> Result<TgCommand, anyhow::Error> {
        let data = self
            .callback_data_cache
            .get(reference)
            .ok_or_else(|| anyhow::anyhow!("Callback data cannot be restored"))?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn get_dm_message_command(&self, user_id: &UserId) -> Option<MessageCommand> {
        self.dm_message_commands
            .get(user_id)
            .map(|command| command.clone())
    }

    pub fn set_dm_message_command(&self, user_id: UserId, command: MessageCommand) {
        self.dm_message_commands.insert(user_id, command);
    }

    pub fn remove_dm_message_command(&self, user_id: &UserId) {
        self.dm_message_commands.remove(user_id);
    }

    pub async fn send_text_message(
        &self,
        chat_id: ChatId,
        message: String,
        reply_markup: impl Into<ReplyMarkup>,
    ) -> Result<Message, anyhow::Error> {
        Ok(self
            .bot
            .send_message(chat_id, &message)
            .parse_mode(ParseMode::MarkdownV2)
            .reply_markup(reply_markup)
            .link_preview_options(LinkPreviewOptions {
                is_disabled: true,
                url: None,
                prefer_small_media: false,
                prefer_large_media: false,
                show_above_text: false,
            })
            .await
            .inspect_err(log_parse_error(message))?)
    }

    pub async fn send(
        &self,
        chat_id: ChatId,
        text: impl Into<String>,
        reply_markup: impl Into<ReplyMarkup>,
        attachment: Attachment,
    ) -> Result<Message, anyhow::Error> {
        let text = text.into();
        Ok(match attachment {
            Attachment::None => {
                if text.len() < 4096 {
                    self.bot
                        .send_message(chat_id, text.clone())
                        .parse_mode(ParseMode::MarkdownV2)
                        .reply_markup(reply_markup)
                        .link_preview_options(LinkPreviewOptions {
                            is_disabled: true,
                            url: None,
                            prefer_small_media: false,
                            prefer_large_media: false,
                            show_above_text: false,
                        })
                        .await
                        .inspect_err(log_parse_error(text))?
                } else {
                    self.bot
                        .send_document(
                            chat_id,
                            InputFile::memory({
                                const CHARS: [char; 19] = [
                                    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+',
                                    '-', '=', '|', '{', '}', '.', '!',
                                ];

                                let mut text = text;
                                for c in CHARS {
                                    text = text.replace(&format!("\\{c}"), &c.to_string());
                                }
                                text
                            })
                            .file_name("message.txt"),
                        )
                        .caption("The response was too long, so it was sent as a file\\.")
                        .parse_mode(ParseMode::MarkdownV2)
                        .reply_markup(reply_markup)
                        .await?
                }
            }
            Attachment::PhotoUrl(url) => self
                .bot
                .send_photo(chat_id, InputFile::url(url))
                .caption(text.clone())
                .parse_mode(ParseMode::MarkdownV2)
                .reply_markup(reply_markup)
                .await
                .inspect_err(log_parse_error(text))?,
            Attachment::PhotoBytes(bytes) => self
                .bot
                .send_photo(chat_id, InputFile::memory(bytes))
                .caption(text.clone())
                .parse_mode(ParseMode::MarkdownV2)
                .reply_markup(reply_markup)
                .await
                .inspect_err(log_parse_error(text))?,
            Attachment::DocumentText(content, file_name) => self
                .bot
                .send_document(chat_id, InputFile::memory(content).file_name(file_name))
                .caption(text.clone())
                .parse_mode(ParseMode::MarkdownV2)
                .reply_markup(reply_markup)
                .await
                .inspect_err(log_parse_error(text))?,
        })
    }
}

pub struct TgCallbackContext<'a> {
    bot: &'a BotData,
    user_id: UserId,
    chat_id: ChatId,
    last_message: Option<MessageId>,
    data: &'a str,
}

impl<'a> TgCallbackContext<'a> {
    pub fn new(
        bot: &'a BotData,
        user_id: UserId,
        chat_id: ChatId,
        last_message: Option<MessageId>,
        data: &'a str,
    ) -> Self {
        Self {
            bot,
            user_id,
            chat_id,
            last_message,
            data,
        }
    }

    pub fn bot(&self) -> &BotData {
        self.bot
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.last_message
    }

    pub fn data(&self) -> &str {
        self.data
    }

    pub fn parse_command(&self) -> Result<TgCommand, anyhow::Error> {
        self.bot.parse_callback_data(self.data)
    }

    pub async fn edit_or_send(
        &mut self,
        text: impl Into<String>,
        reply_markup: InlineKeyboardMarkup,
    ) -> Result<(), anyhow::Error> {
        let text = text.into();
        if text.len() >= 4096 {
            // Will send as a .txt document
            let message = self.send(text, reply_markup, Attachment::None).await?;
            self.last_message = Some(message.id);
            return Ok(());
        }
        if let Some(message_id) = self.last_message {
            let edit_result = self
                .bot
                .bot()
                .edit_message_text(self.chat_id, message_id, text.clone())
                .parse_mode(ParseMode::MarkdownV2)
                .link_preview_options(LinkPreviewOptions {
                    is_disabled: true,
                    url: None,
                    prefer_small_media: false,
                    prefer_large_media: false,
                    show_above_text: false,
                })
                .reply_markup(reply_markup.clone())
                .await;
            match edit_result {
                Ok(_) => {}
                Err(RequestError::Api(ApiError::MessageNotModified)) => {}
                Err(RequestError::Api(ApiError::Unknown(error_text))) => {
                    if error_text == "Bad Request: there is no text in the message to edit" {
                        let message = self.send(text, reply_markup, Attachment::None).await?;
                        self.last_message = Some(message.id);
                    } else {
                        return Err(anyhow::anyhow!(
                            "Error editing message: Unknown error: {:?}",
                            error_text
                        ));
                    }
                }
                Err(err) => {
                    return Err(anyhow::anyhow!("Error editing message: {:?}", err));
                }
            }
        } else {
            let message = self.send(text, reply_markup, Attachment::None).await?;
            self.last_message = Some(message.id);
        }
        Ok(())
    }

    pub async fn send(
        &self,
        text: impl Into<String>,
        reply_markup: impl Into<ReplyMarkup>,
        attachment: Attachment,
    ) -> Result<Message, anyhow::Error> {
        self.bot
            .send(self.chat_id, text, reply_markup, attachment)
            .await
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub enum Attachment {
    #[default]
    None,
    PhotoUrl(Url),
    PhotoBytes(Vec<u8>),
    DocumentText(String, String),
}

pub struct MustAnswerCallbackQuery {
    pub(crate) bot_id: UserId,
    pub(crate) callback_query: String,
    pub(crate) callback_query_answered: bool,
}

impl MustAnswerCallbackQuery {
    pub async fn answer_callback_query(mut self, app: &AppState) {
        let bot = app
            .bot(&self.bot_id)
            .expect("Bot not found while answering a callback query");
        if let Err(err) = bot.bot().answer_callback_query(&self.callback_query).await {
            warn!(
                "Error answering callback query {}: {:?}",
                self.callback_query, err
            );
        }
        self.callback_query_answered = true;
    }
}

impl Drop for MustAnswerCallbackQuery {
    fn drop(&mut self) {
        if !self.callback_query_answered {
            panic!("Callback query {} was not answered", self.callback_query);
        }
    }
}

fn log_parse_error(text: impl Into<String>) -> impl FnOnce(&RequestError) {
    let text = text.into();
    move |err| {
        if let RequestError::Api(ApiError::CantParseEntities(s)) = err {
            log::warn!("Can't parse entities in message: {s}\n{text:?}");
        }
    }
}
