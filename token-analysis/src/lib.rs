use async_trait::async_trait;
use itertools::Itertools;

use bubblebot_common::app::BotModule;
use bubblebot_common::bot_commands::{MessageCommand, TgCommand};
use bubblebot_common::chains;
use bubblebot_common::parser::{self, AnalysisRequest, ParseError};
use bubblebot_common::teloxide::prelude::{ChatId, Message, Requester, UserId};
use bubblebot_common::teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use bubblebot_common::teloxide::utils::markdown;
use bubblebot_common::tgbot::{
    Attachment, BotData, MustAnswerCallbackQuery, TgCallbackContext,
};
use bubblebot_common::utils::bubblemaps::{self, MapData};
use bubblebot_common::utils::coingecko::{self, MarketData};
use bubblebot_common::utils::fmt::{format_percent_change, format_usd_amount};

mod screenshot;

use screenshot::ScreenshotPool;

pub struct TokenAnalysisModule {
    screenshots: ScreenshotPool,
}

impl TokenAnalysisModule {
    pub fn new() -> Self {
        Self {
            screenshots: ScreenshotPool::from_env(),
        }
    }

    async fn open_main_menu(&self, bot: &BotData, chat_id: ChatId) -> Result<(), anyhow::Error> {
        bot.send_text_message(chat_id, welcome_message(), main_menu_buttons(bot))
            .await?;
        Ok(())
    }

    /// Runs a raw line through the parser. Parse failures reply with a
    /// corrective message, but only when `reply_on_error` is set: group chats
    /// see ordinary conversation here and must not be spammed.
    async fn handle_analysis_input(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        text: &str,
        reply_on_error: bool,
    ) -> Result<(), anyhow::Error> {
        match parser::parse(text) {
            Ok(request) => self.dispatch(bot, chat_id, request).await,
            Err(err) => {
                if !reply_on_error {
                    return Ok(());
                }
                let message = match err {
                    ParseError::UnknownChain(code) => unknown_chain_message(&code),
                    ParseError::MissingArgument(_) | ParseError::MalformedAddress(_) => {
                        usage_message()
                    }
                };
                bot.send_text_message(chat_id, message, no_buttons()).await?;
                Ok(())
            }
        }
    }

    /// Fans a validated request out to the collaborators and assembles the
    /// reply. Upstream failures never propagate to the update loop: the map
    /// being unavailable degrades to a "try again later" reply, a missing
    /// market listing or a failed screenshot just shrink the reply.
    async fn dispatch(
        &self,
        bot: &BotData,
        chat_id: ChatId,
        request: AnalysisRequest,
    ) -> Result<(), anyhow::Error> {
        log::info!(
            "Processing contract {} on {}",
            request.address,
            request.chain.code
        );
        let processing = bot
            .send_text_message(
                chat_id,
                "🔄 Processing request\\.\\.\\.".to_string(),
                no_buttons(),
            )
            .await?;

        let market_data = async {
            match request.chain.coingecko_platform {
                Some(platform) => {
                    coingecko::get_market_data(platform.to_string(), request.address.clone()).await
                }
                None => Ok(None),
            }
        };
        let (map_data, market_data, screenshot) = tokio::join!(
            bubblemaps::get_map_data(request.chain, &request.address),
            market_data,
            self.screenshots.capture(request.chain, &request.address),
        );

        if let Err(err) = bot.bot().delete_message(chat_id, processing.id).await {
            log::warn!("Failed to delete the processing message: {err:?}");
        }

        let map_data = match map_data {
            Ok(Some(map_data)) => map_data,
            Ok(None) => {
                bot.send_text_message(
                    chat_id,
                    "❌ Map not computed or token not found\\.".to_string(),
                    no_buttons(),
                )
                .await?;
                return Ok(());
            }
            Err(err) => {
                log::warn!(
                    "Map data request failed for {} on {}: {err}",
                    request.address,
                    request.chain.code
                );
                bot.send_text_message(
                    chat_id,
                    "❌ Error processing request\\. Please try again later\\.".to_string(),
                    no_buttons(),
                )
                .await?;
                return Ok(());
            }
        };
        let market_data = match market_data {
            Ok(market_data) => market_data,
            Err(err) => {
                log::warn!("Market data request failed for {}: {err}", request.address);
                None
            }
        };
        let attachment = match screenshot {
            Ok(bytes) => Attachment::PhotoBytes(bytes),
            Err(err) => {
                log::error!("Screenshot error: {err:?}");
                Attachment::None
            }
        };

        let caption = format_analysis_caption(&request, &map_data, market_data.as_ref());
        bot.send(chat_id, caption, no_buttons(), attachment).await?;
        Ok(())
    }
}

impl Default for TokenAnalysisModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BotModule for TokenAnalysisModule {
    fn name(&self) -> &'static str {
        "Token Analysis"
    }

    async fn handle_message(
        &self,
        bot: &BotData,
        user_id: Option<UserId>,
        chat_id: ChatId,
        command: MessageCommand,
        text: &str,
        _message: &Message,
    ) -> Result<(), anyhow::Error> {
        let Some(user_id) = user_id else {
            return Ok(());
        };
        match command {
            MessageCommand::Start(_) => {
                if !chat_id.is_user() {
                    return Ok(());
                }
                self.open_main_menu(bot, chat_id).await?;
            }
            MessageCommand::AnalyzeToken => {
                if !chat_id.is_user() {
                    return Ok(());
                }
                bot.remove_dm_message_command(&user_id);
                self.handle_analysis_input(bot, chat_id, text, true).await?;
            }
            MessageCommand::None => {
                if text.is_empty() || text.starts_with('/') {
                    return Ok(());
                }
                self.handle_analysis_input(bot, chat_id, text, chat_id.is_user())
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_callback<'a>(
        &'a self,
        mut context: TgCallbackContext<'a>,
        _query: &mut Option<MustAnswerCallbackQuery>,
    ) -> Result<(), anyhow::Error> {
        if !context.chat_id().is_user() {
            return Ok(());
        }
        match context.parse_command()? {
            TgCommand::OpenMainMenu => {
                context.bot().remove_dm_message_command(&context.user_id());
                let reply_markup = main_menu_buttons(context.bot());
                context.edit_or_send(welcome_message(), reply_markup).await?;
            }
            TgCommand::AnalyzeToken => {
                context
                    .bot()
                    .set_dm_message_command(context.user_id(), MessageCommand::AnalyzeToken);
                let message = "Send me a token contract address in format:\n`<address> <chain>`\n\nExample: `0x603c7f932ED1fc6575303D8Fb018fDCBb0f39a95 bsc`\nOr for Solana: `EjpUeZQ3xT2Q35b9t5uAqxcJq1QqykZzBJbJxDoX1eK sol`".to_string();
                let buttons = vec![vec![InlineKeyboardButton::callback(
                    "⬅️ Cancel",
                    context.bot().to_callback_data(&TgCommand::OpenMainMenu),
                )]];
                let reply_markup = InlineKeyboardMarkup::new(buttons);
                context.edit_or_send(message, reply_markup).await?;
            }
            TgCommand::SupportedChains => {
                let list = chains::entries()
                    .map(|entry| {
                        format!(
                            "• `{code}`: {name}",
                            code = entry.code,
                            name = markdown::escape(entry.display_name),
                        )
                    })
                    .join("\n");
                let message = format!("Supported chains:\n\n{list}");
                let buttons = vec![vec![InlineKeyboardButton::callback(
                    "⬅️ Back",
                    context.bot().to_callback_data(&TgCommand::OpenMainMenu),
                )]];
                let reply_markup = InlineKeyboardMarkup::new(buttons);
                context.edit_or_send(message, reply_markup).await?;
            }
        }
        Ok(())
    }
}

fn no_buttons() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(Vec::<Vec<_>>::new())
}

fn main_menu_buttons(bot: &BotData) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "🔍 Analyze a token",
            bot.to_callback_data(&TgCommand::AnalyzeToken),
        )],
        vec![InlineKeyboardButton::callback(
            "⛓ Supported chains",
            bot.to_callback_data(&TgCommand::SupportedChains),
        )],
    ])
}

fn welcome_message() -> String {
    format!(
        "🔍 *Bubblemaps Bot* 🔍

Main features:
1\\. Generates a token bubble map screenshot
2\\. Provides detailed token information
3\\. Shows market data \\(if available\\)

Send me a token contract address in format:
`<address> <chain>`

Example: `0x603c7f932ED1fc6575303D8Fb018fDCBb0f39a95 bsc`
Or for Solana: `EjpUeZQ3xT2Q35b9t5uAqxcJq1QqykZzBJbJxDoX1eK sol`

Supported chains: {chains}",
        chains = markdown::escape(&chains::supported_codes().join(", ")),
    )
}

fn usage_message() -> String {
    format!(
        "❌ Invalid format\\. Use:
`<address> <chain>`

Supported chains: {chains}",
        chains = markdown::escape(&chains::supported_codes().join(", ")),
    )
}

fn unknown_chain_message(code: &str) -> String {
    format!(
        "❌ Unknown chain *{code}*\\. Supported chains: {chains}",
        code = markdown::escape(code),
        chains = markdown::escape(&chains::supported_codes().join(", ")),
    )
}

fn format_analysis_caption(
    request: &AnalysisRequest,
    map: &MapData,
    market: Option<&MarketData>,
) -> String {
    let mut lines = vec![
        format!(
            "📊 *{name} \\({symbol}\\)*",
            name = markdown::escape(map.full_name.as_deref().unwrap_or("N/A")),
            symbol = markdown::escape(map.symbol.as_deref().unwrap_or("N/A")),
        ),
        String::new(),
        format!(
            "• Network: {}",
            markdown::escape(request.chain.display_name)
        ),
        format!("• Address: `{}`", request.address),
        format!(
            "• Updated: {}",
            markdown::escape(&match &map.dt_update {
                Some(dt_update) => bubblemaps::format_update_time(dt_update),
                None => "N/A".to_string(),
            })
        ),
    ];
    if let Some(market) = market {
        let has_any_field = market.price_usd.is_some()
            || market.market_cap_usd.is_some()
            || market.volume_24h_usd.is_some()
            || market.price_change_24h.is_some();
        if has_any_field {
            lines.push(String::new());
            lines.push("💹 *Market Data:*".to_string());
            if let Some(price) = market.price_usd {
                lines.push(format!(
                    "• Price: {}",
                    markdown::escape(&format_usd_amount(price))
                ));
            }
            if let Some(market_cap) = market.market_cap_usd {
                lines.push(format!(
                    "• Market Cap: {}",
                    markdown::escape(&format_usd_amount(market_cap))
                ));
            }
            if let Some(volume) = market.volume_24h_usd {
                lines.push(format!(
                    "• Volume \\(24h\\): {}",
                    markdown::escape(&format_usd_amount(volume))
                ));
            }
            if let Some(change) = market.price_change_24h {
                lines.push(format!(
                    "• Price Change \\(24h\\): {}",
                    markdown::escape(&format_percent_change(change))
                ));
            }
        }
    }
    if let Some(holder) = map.nodes.first() {
        lines.push(String::new());
        lines.push("🏆 *Top Holder:*".to_string());
        if let Some(name) = &holder.name {
            lines.push(format!("• Name: {}", markdown::escape(name)));
        }
        lines.push(format!("• Address: `{}`", holder.address));
        lines.push(format!(
            "• Percentage: {}",
            markdown::escape(&format!("{:.2}%", holder.percentage))
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bubblebot_common::utils::bubblemaps::HolderNode;

    fn sample_map() -> MapData {
        MapData {
            full_name: Some("ApeSwap".to_string()),
            symbol: Some("BANANA".to_string()),
            dt_update: Some("2024-03-08T10:23:08.529Z".to_string()),
            nodes: vec![HolderNode {
                address: "0xdead000000000000000000000000000000000000".to_string(),
                name: Some("Burn".to_string()),
                amount: 12345.6,
                percentage: 21.784,
                is_contract: true,
            }],
        }
    }

    fn sample_request() -> AnalysisRequest {
        parser::parse("0x603c7f932ED1fc6575303D8Fb018fDCBb0f39a95 bsc").unwrap()
    }

    #[test]
    fn caption_includes_token_chain_and_holder() {
        let caption = format_analysis_caption(&sample_request(), &sample_map(), None);
        assert!(caption.contains("*ApeSwap \\(BANANA\\)*"));
        assert!(caption.contains("• Network: BNB Smart Chain"));
        assert!(caption.contains("`0x603c7f932ED1fc6575303D8Fb018fDCBb0f39a95`"));
        assert!(caption.contains("2024\\-03\\-08 10:23 UTC"));
        assert!(caption.contains("🏆 *Top Holder:*"));
        assert!(caption.contains("• Percentage: 21\\.78%"));
        assert!(!caption.contains("💹"));
    }

    #[test]
    fn caption_includes_market_block_when_present() {
        let market = MarketData {
            price_usd: Some(0.012345),
            market_cap_usd: Some(1_234_567.0),
            volume_24h_usd: None,
            price_change_24h: Some(-2.349),
        };
        let caption = format_analysis_caption(&sample_request(), &sample_map(), Some(&market));
        assert!(caption.contains("💹 *Market Data:*"));
        assert!(caption.contains("• Price: $0\\.0123"));
        assert!(caption.contains("• Market Cap: $1,234,567"));
        assert!(!caption.contains("Volume"));
        assert!(caption.contains("• Price Change \\(24h\\): \\-2\\.35%"));
    }

    #[test]
    fn caption_falls_back_when_metadata_is_missing() {
        let map = MapData {
            full_name: None,
            symbol: None,
            dt_update: None,
            nodes: Vec::new(),
        };
        let caption = format_analysis_caption(&sample_request(), &map, None);
        assert!(caption.contains("*N/A \\(N/A\\)*"));
        assert!(caption.contains("• Updated: N/A"));
        assert!(!caption.contains("Top Holder"));
    }

    #[test]
    fn empty_market_data_adds_no_block() {
        let market = MarketData {
            price_usd: None,
            market_cap_usd: None,
            volume_24h_usd: None,
            price_change_24h: None,
        };
        let caption = format_analysis_caption(&sample_request(), &sample_map(), Some(&market));
        assert!(!caption.contains("Market Data"));
    }
}
