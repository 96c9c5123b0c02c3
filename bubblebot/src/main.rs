use std::time::Duration;

use bubblebot_common::app::App;
use bubblebot_common::teloxide::adaptors::throttle::Limits;
use bubblebot_common::teloxide::adaptors::CacheMe;
use bubblebot_common::teloxide::prelude::{Bot, RequesterExt};
use bubblebot_common::tgbot::BotData;
use log::info;
use reqwest::Url;
use token_analysis::TokenAnalysisModule;

fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_module_level(
            "bubblebot_common",
            if std::env::var("DEBUG").is_ok() {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            },
        )
        .with_module_level(
            "token_analysis",
            if std::env::var("DEBUG").is_ok() {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            },
        )
        .env()
        .init()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async {
            let app = App::new();

            let base: Url = if let Ok(url) = std::env::var("TELEGRAM_API_URL") {
                url.parse()?
            } else {
                "https://api.telegram.org".parse().unwrap()
            };

            let token = std::env::var("TELEGRAM_BOT_TOKEN")
                .map_err(|_| anyhow::anyhow!("TELEGRAM_BOT_TOKEN is not set"))?;
            let main_bot = BotData::new(
                CacheMe::new(
                    Bot::with_client(
                        token,
                        reqwest::Client::builder()
                            .timeout(Duration::from_secs(30))
                            .build()
                            .unwrap(),
                    )
                    .set_api_url(base)
                    .throttle(Limits {
                        messages_per_sec_overall: 1000, // just to increase queue size
                        ..Limits::default()
                    }),
                ),
                app.arc_clone_state(),
            )
            .await?;
            app.state().add_bot(main_bot);

            app.state().add_bot_module(TokenAnalysisModule::new()).await;

            app.start_tg_bots().await?;

            info!("BubbleBot started");

            tokio::time::sleep(Duration::from_secs(u64::MAX)).await;

            Ok(())
        })
}
