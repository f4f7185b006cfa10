use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
mod config;
mod error;
mod events;
pub mod mappings;
mod services;
mod utils;

use config::Config;
use error::HookInstallError;
use events::KeyCode;
use mappings::KeyNames;
use services::{
    create_hook_backend, AddMappingWorkflow, CaptureSession, Console, ConsoleExit, ConsoleResolver,
    HookEngine, MappingTable, SettingsStore, VirtualDevice,
};

#[derive(Parser, Debug)]
#[command(name = "keyswap")]
#[command(version, about = "Глобальная подмена одной клавиши на другую")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "keyswap.toml")]
    config: PathBuf,

    /// Режим сухого запуска (без захвата клавиатуры и инъекции)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (по умолчанию из конфигурации)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Перехватывать клавиатуру и применять подмены (по умолчанию)
    Run,
    /// Показать сохранённые подмены
    List,
    /// Добавить или перезаписать подмену в файле
    Add { source: KeyCode, target: KeyCode },
    /// Удалить подмену из файла
    Remove { source: KeyCode },
    /// Удалить все подмены из файла
    Clear,
    /// Показать известные имена клавиш
    Keys,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Arc::new(Config::load(&args.config)?);

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, &config.logging.format)?;

    info!("Конфигурация загружена из: {:?}", args.config);

    let store = SettingsStore::new(&config.settings.path);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config, store, args.dry_run).await,
        Command::List => {
            for mapping in store.load()? {
                println!("{}", mapping);
            }
            Ok(())
        }
        Command::Add { source, target } => edit_offline(&store, |table| table.set_mapping(source, target)),
        Command::Remove { source } => edit_offline(&store, |table| table.remove_mapping(source)),
        Command::Clear => edit_offline(&store, |table| table.remove_all_mappings()),
        Command::Keys => {
            for (name, code) in KeyNames::all() {
                println!("{:<16} {}", name, code);
            }
            Ok(())
        }
    }
}

async fn run(config: Arc<Config>, store: SettingsStore, dry_run: bool) -> Result<()> {
    info!("Запуск keyswap v{}", env!("CARGO_PKG_VERSION"));

    if dry_run {
        warn!("Режим сухого запуска - клавиатура не захватывается, инъекция отключена");
    } else {
        utils::permissions::check_permissions()?;
    }

    let saved = store
        .load()
        .with_context(|| format!("Не удалось загрузить подмены из {:?}", store.path()))?;
    let table = Arc::new(MappingTable::from_pairs(saved));
    info!("Активных подмен: {}", table.len());

    let virtual_device = VirtualDevice::new(&config.input.virtual_device_name, dry_run)
        .map_err(|e| HookInstallError::Injector(e.to_string()))?;
    let engine = Arc::new(HookEngine::new(Arc::clone(&table), Arc::new(virtual_device)));

    let backend = create_hook_backend(Arc::clone(&config), dry_run);
    let mut hook = match backend.install(Arc::clone(&engine)) {
        Ok(hook) => hook,
        Err(e) => {
            warn!("Проверьте, что пользователь состоит в группах 'input' и 'uinput':");
            for line in utils::permissions::setup_commands() {
                warn!("   {}", line);
            }
            return Err(e.into());
        }
    };
    info!("Перехват установлен ({})", hook.backend());

    let store = Arc::new(store);
    let resolver = Arc::new(ConsoleResolver::new());
    let workflow = Arc::new(AddMappingWorkflow::new(
        Arc::clone(&engine),
        Arc::new(CaptureSession::new()),
        resolver.clone(),
        config.capture.clone(),
    ));
    let console = Console::new(Arc::clone(&engine), workflow, resolver, Arc::clone(&store));
    let mut console_handle = tokio::spawn(console.run());
    let mut console_done = false;

    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
                    Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
                }
                break;
            }
            result = &mut console_handle, if !console_done => {
                console_done = true;
                match result {
                    Ok(Ok(ConsoleExit::Quit)) => {
                        info!("Получена команда quit");
                        break;
                    }
                    // Без консоли перехват продолжает работать до Ctrl+C
                    Ok(Ok(ConsoleExit::Eof)) => {}
                    Ok(Err(e)) => error!("Ошибка консоли: {}", e),
                    Err(e) => error!("Задача консоли завершилась аварийно: {}", e),
                }
            }
            _ = hook.stopped() => {
                warn!("Перехват остановился сам (устройство отключено?)");
                break;
            }
        }
    }

    info!("Завершение работы...");
    console_handle.abort();
    hook.uninstall().await;

    let stats = engine.stats();
    info!(
        "Событий: {}, подменено: {}, пропущено: {}",
        stats.seen, stats.remapped, stats.passed_through
    );

    if let Err(e) = store.save(&table.snapshot()) {
        error!("Не удалось сохранить подмены: {}", e);
    }

    info!("keyswap завершил работу");
    Ok(())
}

/// Изменить файл подмен без установки перехвата
fn edit_offline(store: &SettingsStore, edit: impl FnOnce(&MappingTable)) -> Result<()> {
    let table = MappingTable::from_pairs(store.load()?);

    edit(&table);
    store.save(&table.snapshot())?;

    for mapping in table.snapshot() {
        println!("{}", mapping);
    }
    Ok(())
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if format == "full" {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    }

    Ok(())
}
