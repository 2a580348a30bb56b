use std::sync::Arc;

use quotecast::config::BotConfig;
use quotecast::dialogue::DialogueMachine;
use quotecast::dispatch::Dispatcher;
use quotecast::model::{Category, Quote};
use quotecast::scheduler::DeliveryScheduler;
use quotecast::session::SessionStore;
use quotecast::store::{LibSqlBackend, Store};
use quotecast::transport::telegram::TelegramGateway;

/// Starter pool used when the quotes table is empty.
fn starter_quotes() -> Vec<Quote> {
    vec![
        Quote::new(
            Category::Happiness,
            "Happiness is not something ready made. It comes from your own actions.",
            Some("Dalai Lama"),
        ),
        Quote::new(
            Category::Happiness,
            "The happiness of your life depends upon the quality of your thoughts.",
            Some("Marcus Aurelius"),
        ),
        Quote::new(
            Category::Happiness,
            "Count your age by friends, not years. Count your life by smiles, not tears.",
            Some("John Lennon"),
        ),
        Quote::new(
            Category::Love,
            "Love all, trust a few, do wrong to none.",
            Some("William Shakespeare"),
        ),
        Quote::new(
            Category::Love,
            "We are most alive when we are in love.",
            Some("John Updike"),
        ),
        Quote::new(
            Category::Love,
            "The best thing to hold onto in life is each other.",
            Some("Audrey Hepburn"),
        ),
        Quote::new(
            Category::Hope,
            "While there's life, there's hope.",
            Some("Cicero"),
        ),
        Quote::new(
            Category::Hope,
            "Hope is a waking dream.",
            Some("Aristotle"),
        ),
        Quote::new(
            Category::Hope,
            "Once you choose hope, anything is possible.",
            Some("Christopher Reeve"),
        ),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env()?;

    eprintln!("📨 Quotecast v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!(
        "   Comment word limit: {} | Poll timeout: {}s\n",
        config.comment_word_limit, config.poll_timeout_secs,
    );

    let backend = LibSqlBackend::new_local(&config.db_path).await?;
    backend.seed_quotes(&starter_quotes()).await?;
    let store: Arc<dyn Store> = Arc::new(backend);

    let gateway = Arc::new(TelegramGateway::new(
        config.bot_token.clone(),
        config.poll_timeout_secs,
    ));

    let machine = Arc::new(DialogueMachine::new(
        Arc::new(SessionStore::new()),
        Arc::clone(&store),
        gateway.clone(),
        config.comment_word_limit,
    ));

    let scheduler = Arc::new(DeliveryScheduler::new(machine.clone()));
    machine.attach_scheduler(Arc::clone(&scheduler));

    let dispatcher = Dispatcher::new(gateway, machine, scheduler, store);
    dispatcher.run().await?;

    Ok(())
}
