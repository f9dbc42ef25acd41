use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgGroup;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Session;
use crate::domain::models::SessionStore;
use crate::infrastructure::stores::FilesystemStore;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
    std::process::exit(0);
}

fn session_store() -> FilesystemStore {
    return FilesystemStore::new(path::PathBuf::from(Config::get(ConfigKey::SessionDir)));
}

fn format_session(session: &Session) -> String {
    let mut res = format!("- (ID: {}) {:?}, {}", session.id, session.state, session.title);

    if let Some(create_time) = session.create_time {
        res = format!("{res}, created {}", create_time.to_rfc3339());
    }

    return res;
}

async fn print_sessions_list() -> Result<()> {
    let sessions = session_store()
        .fetch_all()
        .await?
        .iter()
        .map(|session| {
            return format_session(session);
        })
        .collect::<Vec<String>>();

    if sessions.is_empty() {
        println!("There are no synced sessions yet. Run the daemon with 'worksync serve' first.");
    } else {
        println!("{}", sessions.join("\n"));
    }

    return Ok(());
}

async fn delete_session(id: &str) -> Result<()> {
    let store = session_store();
    store.delete(id).await?;
    store.purge_artifacts(id).await?;
    return Ok(());
}

async fn delete_all_sessions() -> Result<()> {
    let store = session_store();
    for session in store.fetch_all().await? {
        store.delete(&session.id).await?;
        store.purge_artifacts(&session.id).await?;
    }
    return Ok(());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if !config_file_path.parent().unwrap().exists() {
        fs::create_dir_all(config_file_path.parent().unwrap()).await?;
    }

    let mut file = fs::File::create(config_file_path.clone()).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    let config_path_display = config_file_path.as_os_str().to_str().unwrap();
    println!("Created default config file at {config_path_display}");
    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_debug() -> Command {
    return Command::new("debug")
        .about("Debug helpers for Worksync")
        .hide(true)
        .subcommand(
            Command::new("log-path").about("Output path to debug log file generated when running Worksync with environment variable RUST_LOG=worksync")
        )
        .subcommand(
            Command::new("enum-config").about("List all config keys as strings.")
        );
}

fn subcommand_sessions_delete() -> Command {
    return Command::new("delete")
        .about("Delete one or all synced sessions from the local cache.")
        .arg(
            clap::Arg::new("session-id")
                .short('i')
                .long("id")
                .help("Session ID")
                .num_args(1),
        )
        .arg(
            clap::Arg::new("all")
                .long("all")
                .help("Delete all sessions.")
                .num_args(0),
        )
        .group(
            ArgGroup::new("delete-args")
                .args(["session-id", "all"])
                .required(true),
        );
}

fn subcommand_sessions() -> Command {
    return Command::new("sessions")
        .about("Inspect the local session cache.")
        .arg_required_else_help(true)
        .subcommand(Command::new("dir").about("Print the sessions cache directory path."))
        .subcommand(
            Command::new("list").about("List all synced sessions with their ids and states."),
        )
        .subcommand(subcommand_sessions_delete());
}

fn subcommand_serve() -> Command {
    return Command::new("serve").about("Start the sync daemon.");
}

pub fn build() -> Command {
    let about = format!(
        "{}\n\nVersion: {}\nCommit: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    );

    return Command::new("worksync")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .subcommand(subcommand_serve())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(subcommand_debug())
        .subcommand(subcommand_sessions())
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("WORKSYNC_CONFIG_FILE")
                .num_args(1)
                .help(format!(
                    "Path to configuration file [default: {}]",
                    Config::default(ConfigKey::ConfigFile)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::ApiURL.to_string())
                .long(ConfigKey::ApiURL.to_string())
                .env("WORKSYNC_API_URL")
                .num_args(1)
                .help(format!(
                    "Base URL of the session service. [default: {}]",
                    Config::default(ConfigKey::ApiURL)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::ApiToken.to_string())
                .long(ConfigKey::ApiToken.to_string())
                .env("WORKSYNC_API_TOKEN")
                .num_args(1)
                .help("Bearer token used to authenticate against the session service.")
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::ApiTimeout.to_string())
                .long(ConfigKey::ApiTimeout.to_string())
                .env("WORKSYNC_API_TIMEOUT")
                .num_args(1)
                .help(format!(
                    "Time to wait in milliseconds before timing out when health checking the session service. [default: {}]",
                    Config::default(ConfigKey::ApiTimeout)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::PageSize.to_string())
                .long(ConfigKey::PageSize.to_string())
                .env("WORKSYNC_PAGE_SIZE")
                .num_args(1)
                .help(format!(
                    "Number of sessions requested per page from the session service. [default: {}]",
                    Config::default(ConfigKey::PageSize)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::PollInterval.to_string())
                .long(ConfigKey::PollInterval.to_string())
                .env("WORKSYNC_POLL_INTERVAL")
                .num_args(1)
                .help(format!(
                    "Base polling interval in seconds. [default: {}]",
                    Config::default(ConfigKey::PollInterval)
                ))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::SessionDir.to_string())
                .long(ConfigKey::SessionDir.to_string())
                .env("WORKSYNC_SESSION_DIR")
                .num_args(1)
                .help("Directory where synced sessions are cached. Defaults to a path within the system cache directory.")
                .global(true),
        );
}

pub async fn parse() -> Result<bool> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("debug", debug_matches)) => {
            match debug_matches.subcommand() {
                Some(("log-path", _)) => {
                    let log_path = dirs::cache_dir().unwrap().join("worksync/debug.log");
                    println!("{}", log_path.to_str().unwrap());
                }
                Some(("enum-config", _)) => {
                    let res = ConfigKey::VARIANTS.join("\n");
                    println!("{}", res);
                }
                _ => {
                    subcommand_debug().print_long_help()?;
                }
            }

            return Ok(false);
        }
        Some(("serve", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(false);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(false);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(false);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(false);
            }
        },
        Some(("sessions", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;

            match subcmd_matches.subcommand() {
                Some(("dir", _)) => {
                    println!("{}", Config::get(ConfigKey::SessionDir));
                }
                Some(("list", _)) => {
                    print_sessions_list().await?;
                }
                Some(("delete", delete_matches)) => {
                    if let Some(session_id) = delete_matches.get_one::<String>("session-id") {
                        delete_session(session_id).await?;
                        println!("Deleted session {session_id}");
                    } else if delete_matches.get_one::<bool>("all").is_some() {
                        delete_all_sessions().await?;
                        println!("Deleted all sessions");
                    } else {
                        subcommand_sessions_delete().print_long_help()?;
                    }
                }
                _ => {
                    subcommand_sessions().print_long_help()?;
                }
            }

            return Ok(false);
        }
        _ => {
            return Ok(false);
        }
    }

    return Ok(true);
}
