use std::path::PathBuf;
use std::sync::Arc;

use taskmaster::Error;
use taskmaster::app::AppContext;
use taskmaster::config::AppConfig;
use taskmaster::controller::{DeviceServices, LocationNotice, TaskListController};
use taskmaster::core::task::Location;
use taskmaster::device::{FileImageSource, StaticLocator};

const USAGE: &str = "usage: taskmaster <command>

commands:
  login <email> <password>
  register <email> <password>
  logout
  list
  add <title> [--photo PATH] [--lat X --lon Y]
  toggle <id>
  delete <id> [--yes]
  stats";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Login { email: String, password: String },
    Register { email: String, password: String },
    Logout,
    List,
    Add {
        title: String,
        photo: Option<PathBuf>,
        location: Option<Location>,
    },
    Toggle { id: String },
    Delete { id: String, confirmed: bool },
    Stats,
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn parse_coordinate(args: &[String], flag: &str) -> Result<Option<f64>, String> {
    flag_value(args, flag)
        .map(|v| v.parse::<f64>().map_err(|_| format!("{} expects a number, got {}", flag, v)))
        .transpose()
}

impl Command {
    fn parse(args: &[String]) -> Result<Self, String> {
        let positional = |i: usize, name: &str| -> Result<String, String> {
            args.get(i)
                .filter(|a| !a.starts_with("--"))
                .cloned()
                .ok_or_else(|| format!("missing <{}>", name))
        };

        match args.first().map(|s| s.as_str()) {
            Some("login") => Ok(Self::Login {
                email: positional(1, "email")?,
                password: positional(2, "password")?,
            }),
            Some("register") => Ok(Self::Register {
                email: positional(1, "email")?,
                password: positional(2, "password")?,
            }),
            Some("logout") => Ok(Self::Logout),
            Some("list") => Ok(Self::List),
            Some("add") => {
                let location = match (
                    parse_coordinate(args, "--lat")?,
                    parse_coordinate(args, "--lon")?,
                ) {
                    (Some(lat), Some(lon)) => Some(Location::new(lat, lon)),
                    (None, None) => None,
                    _ => return Err("--lat and --lon must be given together".to_string()),
                };
                Ok(Self::Add {
                    title: positional(1, "title")?,
                    photo: flag_value(args, "--photo").map(PathBuf::from),
                    location,
                })
            }
            Some("toggle") => Ok(Self::Toggle {
                id: positional(1, "id")?,
            }),
            Some("delete") => Ok(Self::Delete {
                id: positional(1, "id")?,
                confirmed: args.iter().any(|a| a == "--yes"),
            }),
            Some("stats") => Ok(Self::Stats),
            Some(other) => Err(format!("unknown command {}", other)),
            None => Err("no command given".to_string()),
        }
    }
}

fn ensure_listed(list: &TaskListController, id: &str) -> taskmaster::Result<()> {
    if list.tasks().iter().any(|t| t.id == id) {
        Ok(())
    } else {
        Err(Error::validation(format!("No task {}", id)))
    }
}

async fn run(app: &AppContext, command: Command) -> taskmaster::Result<()> {
    match command {
        Command::Login { email, password } => {
            app.session().sign_in(&email, &password).await?;
            println!("Signed in as {}", email.trim());
        }
        Command::Register { email, password } => {
            app.session().register(&email, &password).await?;
            println!("Account created, sign in now.");
        }
        Command::Logout => {
            app.session().sign_out().await;
            println!("Signed out");
        }
        Command::List => {
            let mut list = app.task_list()?;
            list.on_focus().await?;
            if list.tasks().is_empty() {
                println!("No pending tasks");
            }
            for task in list.tasks() {
                let mark = if task.completed { "x" } else { " " };
                print!("[{}] {}  {}", mark, task.id, task.title);
                if let Some(location) = task.location {
                    print!("  ({})", location);
                }
                if let Some(image) = &task.image_uri {
                    print!("  {}", image);
                }
                println!();
            }
        }
        Command::Add {
            title,
            photo,
            location,
        } => {
            let has_location = location.is_some();
            let images = Arc::new(FileImageSource::new(photo.clone()));
            let device = DeviceServices {
                camera: images.clone(),
                library: images,
                locator: Arc::new(match location {
                    Some(loc) => StaticLocator::fixed(loc),
                    None => StaticLocator::unavailable(),
                }),
            };
            let mut form = app.task_creation(device)?;
            form.set_title(title);
            if photo.is_some() {
                form.pick_image().await?;
            }
            if has_location || app.config().require_location {
                match form.acquire_location().await? {
                    LocationNotice::Current => {}
                    LocationNotice::LastKnown => println!("Using your last known location (weak GPS signal)"),
                    LocationNotice::Fallback => println!("Using the fallback location"),
                }
            }
            match form.submit().await? {
                Some(task) => println!("Created {}", task.id),
                None => println!("Task created"),
            }
        }
        Command::Toggle { id } => {
            let mut list = app.task_list()?;
            list.refresh().await?;
            ensure_listed(&list, &id)?;
            list.toggle(&id).await?;
            println!("Toggled {}", id);
        }
        Command::Delete { id, confirmed } => {
            let mut list = app.task_list()?;
            list.refresh().await?;
            ensure_listed(&list, &id)?;
            list.request_delete(id.clone());
            if !confirmed {
                list.cancel_delete();
                println!("Pass --yes to delete {}", id);
                return Ok(());
            }
            list.confirm_delete().await?;
            println!("Deleted {}", id);
        }
        Command::Stats => {
            let mut list = app.task_list()?;
            list.refresh().await?;
            let stats = list.stats();
            println!(
                "Total: {}  Done: {}  Pending: {}",
                stats.total, stats.completed, stats.pending
            );
        }
    }
    Ok(())
}

fn init_logging(debug: bool) {
    // Journal (`journalctl --user -t taskmaster -f`). Our crate at info/debug, everything else at warn.
    struct FilteredJournal {
        inner: systemd_journal_logger::JournalLog,
    }

    impl log::Log for FilteredJournal {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            if metadata.target().starts_with("taskmaster") {
                let max = if taskmaster::debug_logging() {
                    log::LevelFilter::Debug
                } else {
                    log::LevelFilter::Info
                };
                metadata.level() <= max
            } else {
                metadata.level() <= log::LevelFilter::Warn
            }
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.inner.log(record);
            }
        }
        fn flush(&self) {
            self.inner.flush();
        }
    }

    taskmaster::set_debug_logging(debug);

    let journal = match systemd_journal_logger::JournalLog::new() {
        Ok(journal) => journal.with_syslog_identifier("taskmaster".to_string()),
        Err(e) => {
            eprintln!("journal unavailable, logging disabled: {}", e);
            return;
        }
    };
    if log::set_boxed_logger(Box::new(FilteredJournal { inner: journal })).is_ok() {
        // Global max must be Debug so debug logs can pass through when toggled
        log::set_max_level(log::LevelFilter::Debug);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config, warnings) = AppConfig::load();
    init_logging(config.debug_logging);
    for warning in warnings {
        log::warn!("{}", warning);
        eprintln!("warning: {}", warning);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let app = AppContext::new(config)?;
    app.init().await;

    if let Err(e) = run(&app, command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
