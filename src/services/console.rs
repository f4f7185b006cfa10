use crate::error::Result;
use crate::events::KeyCode;
use crate::keyswap_error;
use crate::services::{AddMappingWorkflow, ConflictResolver, HookEngine, SettingsStore};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const HELP: &str = "\
Команды:
  list                 показать активные подмены
  set <src> <dst>      добавить или перезаписать подмену (клавиша: имя, код или #код)
  remove <src>         удалить подмену
  clear                удалить все подмены
  capture              записать подмену с клавиатуры (две клавиши подряд)
  cancel               отменить запись
  save                 сохранить подмены в файл
  stats                счётчики перехватчика
  help                 эта справка
  quit                 завершить работу";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    Set(KeyCode, KeyCode),
    Remove(KeyCode),
    Clear,
    Capture,
    Cancel,
    Save,
    Stats,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Разобрать строку; пустая строка - `None`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let parsed = match (command.to_lowercase().as_str(), args.as_slice()) {
            ("list" | "ls", []) => ConsoleCommand::List,
            ("set" | "map", [source, target]) => ConsoleCommand::Set(source.parse()?, target.parse()?),
            ("remove" | "rm", [source]) => ConsoleCommand::Remove(source.parse()?),
            ("clear", []) => ConsoleCommand::Clear,
            ("capture" | "add", []) => ConsoleCommand::Capture,
            ("cancel", []) => ConsoleCommand::Cancel,
            ("save", []) => ConsoleCommand::Save,
            ("stats", []) => ConsoleCommand::Stats,
            ("help" | "?", []) => ConsoleCommand::Help,
            ("quit" | "exit", []) => ConsoleCommand::Quit,
            (other, _) => return Err(keyswap_error!(internal, "неизвестная команда или аргументы: '{}'", other)),
        };

        Ok(Some(parsed))
    }
}

/// Почему консоль завершилась
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    Eof,
}

/// Спрашивает подтверждение перезаписи следующей строкой консоли
#[derive(Default)]
pub struct ConsoleResolver {
    pending: Mutex<Option<oneshot::Sender<bool>>>,
}

impl ConsoleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Если ждём ответа - поглотить строку как ответ
    pub fn answer(&self, line: &str) -> bool {
        match self.pending.lock().take() {
            Some(tx) => {
                let yes = matches!(line.trim().to_lowercase().as_str(), "y" | "yes" | "д" | "да");
                let _ = tx.send(yes);
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl ConflictResolver for ConsoleResolver {
    async fn confirm_replace(&self, source: KeyCode, current: KeyCode, proposed: KeyCode) -> bool {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(tx);
        println!(
            "Клавиша {} уже подменена на {}. Заменить на {}? [y/N]",
            source.label(),
            current.label(),
            proposed.label()
        );
        rx.await.unwrap_or(false)
    }
}

/// Управляющая консоль на stdin, работающая параллельно с перехватом
pub struct Console {
    engine: Arc<HookEngine>,
    workflow: Arc<AddMappingWorkflow>,
    resolver: Arc<ConsoleResolver>,
    store: Arc<SettingsStore>,
    capture_task: Option<JoinHandle<()>>,
}

impl Console {
    pub fn new(
        engine: Arc<HookEngine>,
        workflow: Arc<AddMappingWorkflow>,
        resolver: Arc<ConsoleResolver>,
        store: Arc<SettingsStore>,
    ) -> Self {
        Self {
            engine,
            workflow,
            resolver,
            store,
            capture_task: None,
        }
    }

    pub async fn run(mut self) -> Result<ConsoleExit> {
        info!("Консоль управления запущена, введите 'help' для справки");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            if self.resolver.answer(&line) {
                continue;
            }

            match ConsoleCommand::parse(&line) {
                Ok(Some(ConsoleCommand::Quit)) => {
                    self.abort_capture();
                    return Ok(ConsoleExit::Quit);
                }
                Ok(Some(command)) => self.execute(command),
                Ok(None) => {}
                Err(e) => println!("Ошибка: {}", e),
            }
        }

        info!("stdin закрыт, консоль остановлена; перехват продолжает работать");
        Ok(ConsoleExit::Eof)
    }

    fn execute(&mut self, command: ConsoleCommand) {
        let table = self.engine.table();
        match command {
            ConsoleCommand::List => {
                let mappings = table.snapshot();
                if mappings.is_empty() {
                    println!("Подмен нет");
                }
                for mapping in mappings {
                    println!("  {}", mapping);
                }
            }
            ConsoleCommand::Set(source, target) => table.set_mapping(source, target),
            ConsoleCommand::Remove(source) => table.remove_mapping(source),
            ConsoleCommand::Clear => table.remove_all_mappings(),
            ConsoleCommand::Capture => self.start_capture(),
            ConsoleCommand::Cancel => self.workflow.session().cancel(),
            ConsoleCommand::Save => {
                if let Err(e) = self.store.save(&table.snapshot()) {
                    error!("Не удалось сохранить подмены: {}", e);
                }
            }
            ConsoleCommand::Stats => {
                let stats = self.engine.stats();
                println!(
                    "Событий: {}, подменено: {}, пропущено: {}, поглощено записью: {}, собственных: {}",
                    stats.seen, stats.remapped, stats.passed_through, stats.suppressed, stats.synthesized_seen
                );
            }
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => {}
        }
    }

    fn start_capture(&mut self) {
        if self.capture_task.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!("Запись подмены уже идёт");
            return;
        }

        println!("Нажмите исходную клавишу, затем целевую ('cancel' - отмена)");
        let workflow = Arc::clone(&self.workflow);
        self.capture_task = Some(tokio::spawn(async move {
            let outcome = workflow.run().await;
            println!("{}", outcome);
        }));
    }

    fn abort_capture(&mut self) {
        if let Some(task) = self.capture_task.take() {
            self.workflow.session().cancel();
            task.abort();
        }
    }
}
