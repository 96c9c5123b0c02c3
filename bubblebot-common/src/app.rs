use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::multiple::RefMulti;
use dashmap::mapref::one::Ref;
use dashmap::DashMap;
use teloxide::prelude::{ChatId, Message, UserId};
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::bot_commands::MessageCommand;
use crate::tgbot::{BotData, MustAnswerCallbackQuery, TgCallbackContext};

pub struct App {
    state: Arc<AppState>,
}

impl App {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AppState::new()),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn arc_clone_state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    pub async fn start_tg_bots(&self) -> Result<(), anyhow::Error> {
        for module in self.state.bot_modules().await.iter() {
            module.start().await?;
        }

        for bot in self.state.bots() {
            bot.start_polling().await?;
        }

        Ok(())
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AppState {
    bots: DashMap<UserId, BotData>,
    bot_modules: RwLock<Vec<Arc<dyn BotModule>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            bots: DashMap::new(),
            bot_modules: RwLock::new(Vec::new()),
        }
    }

    pub fn add_bot(&self, bot: BotData) {
        self.bots.insert(bot.id(), bot);
    }

    pub fn bot(&self, user_id: &UserId) -> Option<Ref<UserId, BotData>> {
        self.bots.get(user_id)
    }

    pub fn bots(&self) -> Vec<RefMulti<UserId, BotData>> {
        self.bots.iter().collect()
    }

    pub async fn add_bot_module<M: BotModule>(&self, module: impl Into<Arc<M>>) {
        self.bot_modules.write().await.push(module.into());
    }

    pub async fn bot_modules(&self) -> RwLockReadGuard<Vec<Arc<dyn BotModule>>> {
        self.bot_modules.read().await
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// A bot feature. Every registered module sees every incoming message and
/// callback query; handler errors are logged by the update loop, never fatal.
#[async_trait]
pub trait BotModule: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn start(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn handle_message(
        &self,
        bot: &BotData,
        user_id: Option<UserId>,
        chat_id: ChatId,
        command: MessageCommand,
        text: &str,
        message: &Message,
    ) -> Result<(), anyhow::Error>;

    async fn handle_callback<'a>(
        &'a self,
        ctx: TgCallbackContext<'a>,
        query: &mut Option<MustAnswerCallbackQuery>,
    ) -> Result<(), anyhow::Error>;
}
