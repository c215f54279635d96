use std::process::exit;

use alloy_primitives::{Address, B256};
use logcast_core::{ListenerId, LogBroadcastOrm, LogFilter, LogRecord};
use logcast_persistence::{build_dev_pool_from_env, PgLogOrm, PoolProvider};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const USAGE: &str = "Uso:
  logcast migrate
  logcast backlog --before <N>
  logcast logs [--from <N>] [--before <N>] [--address <0x..>]
  logcast consumed --block-hash <0x..> --log-index <N> (--job <UUID> | --job-v2 <INT>)
  logcast purge (--job <UUID> | --job-v2 <INT>)
  logcast forget --block-hash <0x..> --log-index <N>";

#[derive(Debug, PartialEq)]
enum Command {
    Migrate,
    Backlog { before: u64 },
    Logs(LogFilter),
    Consumed { block_hash: B256, log_index: u64, listener: ListenerId },
    Purge(ListenerId),
    Forget { block_hash: B256, log_index: u64 },
}

/// Flags `--nombre valor` ya separados; el último valor repetido gana.
struct Flags {
    pairs: Vec<(String, String)>,
}

impl Flags {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut pairs = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let name = args[i].as_str();
            if !name.starts_with("--") {
                return Err(format!("argumento inesperado: {name}"));
            }
            i += 1;
            let value = args.get(i).ok_or_else(|| format!("falta valor para {name}"))?;
            pairs.push((name.trim_start_matches("--").to_string(), value.clone()));
            i += 1;
        }
        Ok(Self { pairs })
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.pairs.iter().rev().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    fn parsed<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, String> {
        match self.get(name) {
            Some(raw) => raw.parse().map(Some).map_err(|_| format!("valor inválido para --{name}: {raw}")),
            None => Ok(None),
        }
    }

    fn required<T: std::str::FromStr>(&self, name: &str) -> Result<T, String> {
        self.parsed(name)?.ok_or_else(|| format!("falta --{name}"))
    }

    fn listener(&self) -> Result<ListenerId, String> {
        match (self.parsed::<Uuid>("job")?, self.parsed::<i32>("job-v2")?) {
            (Some(job), None) => Ok(ListenerId::legacy(job)),
            (None, Some(job)) => Ok(ListenerId::modern(job)),
            (Some(_), Some(_)) => Err("--job y --job-v2 son excluyentes".into()),
            (None, None) => Err("falta --job o --job-v2".into()),
        }
    }
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    let (name, rest) = args.split_first().ok_or("falta subcomando")?;
    let flags = Flags::parse(rest)?;
    match name.as_str() {
        "migrate" => Ok(Command::Migrate),
        "backlog" => Ok(Command::Backlog { before: flags.required("before")? }),
        "logs" => {
            let mut filter = LogFilter::default();
            if let Some(from) = flags.parsed("from")? {
                filter = filter.from_block(from);
            }
            if let Some(before) = flags.parsed("before")? {
                filter = filter.before_block(before);
            }
            if let Some(address) = flags.parsed::<Address>("address")? {
                filter = filter.address(address);
            }
            Ok(Command::Logs(filter))
        }
        "consumed" => Ok(Command::Consumed { block_hash: flags.required("block-hash")?,
                                             log_index: flags.required("log-index")?,
                                             listener: flags.listener()? }),
        "purge" => Ok(Command::Purge(flags.listener()?)),
        "forget" => Ok(Command::Forget { block_hash: flags.required("block-hash")?,
                                         log_index: flags.required("log-index")? }),
        other => Err(format!("subcomando desconocido: {other}")),
    }
}

fn print_logs(logs: &[LogRecord]) -> Result<(), String> {
    for log in logs {
        println!("{}", serde_json::to_string(log).map_err(|e| e.to_string())?);
    }
    Ok(())
}

fn run<O: LogBroadcastOrm>(orm: &O, command: Command) -> Result<(), String> {
    match command {
        Command::Migrate => {
            info!("migraciones al día");
        }
        Command::Backlog { before } => {
            let logs = orm.unconsumed_prior_to_block(before).map_err(|e| e.to_string())?;
            info!(count = logs.len(), before, "backlog");
            print_logs(&logs)?;
        }
        Command::Logs(filter) => {
            let logs = orm.fetch_logs(&filter).map_err(|e| e.to_string())?;
            print_logs(&logs)?;
        }
        Command::Consumed { block_hash, log_index, listener } => {
            match orm.was_consumed(block_hash, log_index, listener).map_err(|e| e.to_string())? {
                Some(consumed) => println!("{consumed}"),
                None => println!("not broadcast"),
            }
        }
        Command::Purge(listener) => {
            orm.purge_unconsumed_for_listener(listener).map_err(|e| e.to_string())?;
            info!(%listener, "broadcasts no consumidos eliminados");
        }
        Command::Forget { block_hash, log_index } => {
            orm.delete_log_and_broadcasts(block_hash, log_index).map_err(|e| e.to_string())?;
            info!(%block_hash, log_index, "log eliminado");
        }
    }
    Ok(())
}

/// Directivas de `RUST_LOG` tal cual; INFO si no hay o no parsean.
fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives.and_then(|d| EnvFilter::try_new(d).ok())
              .unwrap_or_else(|| EnvFilter::new("info"))
}

fn main() {
    // Cargar .env si existe para obtener DATABASE_URL
    let _ = dotenvy::dotenv();
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt().with_env_filter(env_filter(directives.as_deref()))
                             .with_writer(std::io::stderr)
                             .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_command(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            exit(2);
        }
    };

    let pool = match build_dev_pool_from_env() {
        Ok(p) => p,
        Err(e) => {
            error!("pool error: {e}");
            exit(3);
        }
    };
    let orm = PgLogOrm::new(PoolProvider { pool });
    if let Err(e) = run(&orm, command) {
        error!("error: {e}");
        exit(4);
    }
}

#[cfg(test)]
mod tests {
    use logcast_core::InMemoryLogOrm;

    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn parses_consumed_with_modern_listener() {
        let hash = B256::repeat_byte(0xab);
        let cmd = parse_command(&args(&format!("consumed --block-hash {hash} --log-index 3 --job-v2 9"))).unwrap();
        assert_eq!(cmd,
                   Command::Consumed { block_hash: hash,
                                       log_index: 3,
                                       listener: ListenerId::modern(9) });
    }

    #[test]
    fn rejects_both_listener_identities() {
        let err = parse_command(&args(&format!("purge --job {} --job-v2 1", Uuid::nil()))).unwrap_err();
        assert!(err.contains("excluyentes"));
    }

    #[test]
    fn logs_filter_is_built_from_optional_flags() {
        let address = Address::repeat_byte(0x11);
        let cmd = parse_command(&args(&format!("logs --from 5 --address {address}"))).unwrap();
        assert_eq!(cmd, Command::Logs(LogFilter::default().from_block(5).address(address)));
        assert_eq!(parse_command(&args("logs")).unwrap(), Command::Logs(LogFilter::default()));
    }

    #[test]
    fn usage_errors() {
        assert!(parse_command(&[]).is_err());
        assert!(parse_command(&args("backlog")).is_err());
        assert!(parse_command(&args("backlog --before")).is_err());
        assert!(parse_command(&args("backlog --before -1")).is_err());
        assert!(parse_command(&args("forget --block-hash 0x12 --log-index 0")).is_err());
        assert!(parse_command(&args("rewind")).is_err());
    }

    #[test]
    fn rust_log_level_is_kept_as_given() {
        use tracing::level_filters::LevelFilter;

        assert_eq!(env_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(env_filter(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(env_filter(Some("warn,logcast_persistence=trace")).max_level_hint(),
                   Some(LevelFilter::TRACE));
    }

    #[test]
    fn run_forget_against_memory_store() {
        let orm = InMemoryLogOrm::new();
        let log = LogRecord { block_hash: B256::repeat_byte(1),
                              block_number: 1,
                              log_index: 0,
                              address: Address::ZERO,
                              topics: vec![],
                              data: Default::default(),
                              removed: false };
        orm.upsert_log(&log).unwrap();
        run(&orm,
            Command::Forget { block_hash: log.block_hash,
                              log_index: 0 }).unwrap();
        assert!(orm.fetch_logs(&LogFilter::default()).unwrap().is_empty());
    }
}
