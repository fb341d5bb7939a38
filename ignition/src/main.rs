use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod cli;

use ignition_compose as compose;
use ignition_launch as launch;
use ignition_oci as oci;

use crate::cli::{Cli, Command, UpArgs};
use crate::compose::{ConfigurationError, Loader, Project, find_descriptor};
use crate::launch::{LaunchError, UpOptions, UpReport};
use crate::oci::LogStream;

fn initialize_tracing() {
    // Initialize tracing subscriber for human-readable logs
    tracing_subscriber::registry()
        .with(
            // Use some log defaults. These can be overriden using
            // RUST_LOG
            EnvFilter::try_from_default_env().unwrap_or(
                EnvFilter::default()
                    .add_directive("info".parse().unwrap())
                    .add_directive("hyper=error".parse().unwrap())
                    .add_directive("bollard=error".parse().unwrap()),
            ),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::NONE)
                .event_format(fmt::format().compact().with_target(false).without_time()),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    initialize_tracing();

    let cli = cli::parse();
    debug!(?cli, "using config");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", error_chain(&err));
            ExitCode::from(err.exit_code())
        }
    }
}

/// Render an error followed by its sources
fn error_chain(err: &dyn Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        // engine errors already include their source in the message
        let cause_msg = cause.to_string();
        if !msg.ends_with(&cause_msg) {
            msg.push_str(": ");
            msg.push_str(&cause_msg);
        }
        source = cause.source();
    }
    msg
}

async fn run(cli: Cli) -> Result<(), LaunchError> {
    let Cli {
        file,
        project_name,
        command,
    } = cli;

    match command {
        Command::Config => {
            let (path, project) = load_project(file, project_name).await?;
            let yaml = project
                .to_yaml()
                .map_err(|source| ConfigurationError::Malformed { path, source })?;
            print!("{yaml}");
            Ok(())
        }
        Command::Up(args) => {
            let (_, project) = load_project(file, project_name).await?;
            up(project, args).await
        }
        Command::Down => {
            // the project name is enough to find the containers
            let name = match project_name {
                Some(name) => name,
                None => {
                    let (_, project) = load_project(file, None).await?;
                    project.name().to_owned()
                }
            };
            let client = launch::connect().await?;
            let report = launch::down(&client, &name).await?;
            if report.removed.is_empty() {
                info!(project = %name, "no containers to remove");
            }
            Ok(())
        }
    }
}

/// Find and load the descriptor, no container engine involved
async fn load_project(
    file: Option<PathBuf>,
    project_name: Option<String>,
) -> Result<(PathBuf, Project), ConfigurationError> {
    let path = match file {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir().map_err(|source| ConfigurationError::Read {
                path: PathBuf::from("."),
                source,
            })?;
            find_descriptor(&cwd).await?
        }
    };

    let loader = match project_name {
        Some(name) => Loader::new().with_project_name(name),
        None => Loader::new(),
    };
    let project = loader.load_file(&path).await?;
    Ok((path, project))
}

#[instrument(name = "ignition", skip_all, fields(project = project.name()))]
async fn up(project: Project, args: UpArgs) -> Result<(), LaunchError> {
    let client = launch::connect().await?;
    let opts = UpOptions {
        pull: args.pull,
        remove_orphans: args.remove_orphans,
    };
    let report = launch::up(&client, &project, &opts).await?;

    if args.detach || report.services.is_empty() {
        return Ok(());
    }

    follow_logs(&client, project.name(), &report).await
}

/// Print the output of every service until all containers exit or the
/// user interrupts, in which case the containers are stopped
async fn follow_logs(
    client: &oci::Client,
    project: &str,
    report: &UpReport,
) -> Result<(), LaunchError> {
    let mut streams = StreamMap::new();
    for planned in report.services.iter() {
        let container = &planned.container;
        streams.insert(
            container.service.clone(),
            client.container().logs(&container.name),
        );
    }
    let width = report
        .services
        .iter()
        .map(|s| s.container.service.len())
        .max()
        .unwrap_or_default();

    info!("attaching to service logs, press Ctrl-C to stop");
    if relay_logs(&mut streams, width, tokio::signal::ctrl_c()).await == Attach::Interrupted {
        info!("interrupted, stopping containers");
        launch::stop(client, project).await?;
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Attach {
    Finished,
    Interrupted,
}

/// Print log lines until every stream ends or `interrupt` resolves
async fn relay_logs<F>(
    streams: &mut StreamMap<String, LogStream<'_>>,
    width: usize,
    interrupt: F,
) -> Attach
where
    F: Future<Output = std::io::Result<()>>,
{
    // created once so a signal delivered while printing is not lost
    tokio::pin!(interrupt);
    let mut interruptible = true;
    loop {
        tokio::select! {
            next = streams.next() => match next {
                Some((service, Ok(line))) => {
                    for text in line.message.lines() {
                        if line.stderr {
                            eprintln!("{service:<width$} | {text}");
                        } else {
                            println!("{service:<width$} | {text}");
                        }
                    }
                }
                Some((service, Err(err))) => {
                    warn!(%service, "{}", error_chain(&err));
                }
                None => return Attach::Finished,
            },
            res = &mut interrupt, if interruptible => {
                if let Err(err) = res {
                    warn!("failed to listen for interrupts: {err}");
                    interruptible = false;
                    continue;
                }
                return Attach::Interrupted;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::LogLine;
    use pretty_assertions::assert_eq;
    use std::future::{pending, ready};

    fn log_stream(lines: &[&str]) -> LogStream<'static> {
        let lines: Vec<oci::Result<LogLine>> = lines
            .iter()
            .map(|l| {
                Ok(LogLine {
                    stderr: false,
                    message: l.to_string(),
                })
            })
            .collect();
        Box::pin(tokio_stream::iter(lines))
    }

    #[tokio::test]
    async fn test_relay_finishes_when_all_streams_end() {
        let mut streams = StreamMap::new();
        streams.insert(
            "ignite".to_string(),
            log_stream(&["Topology snapshot", "Node started"]),
        );
        streams.insert("web".to_string(), log_stream(&["listening"]));

        let outcome = relay_logs(&mut streams, 6, pending()).await;
        assert_eq!(outcome, Attach::Finished);
    }

    #[tokio::test]
    async fn test_relay_stops_on_interrupt_while_streams_are_open() {
        let mut streams = StreamMap::new();
        let open: LogStream<'static> =
            Box::pin(log_stream(&["Node started"]).chain(tokio_stream::pending()));
        streams.insert("ignite".to_string(), open);

        // fires only after the loop has been polled a few times
        let interrupt = async {
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            Ok::<(), std::io::Error>(())
        };
        let outcome = relay_logs(&mut streams, 6, interrupt).await;
        assert_eq!(outcome, Attach::Interrupted);
    }

    #[tokio::test]
    async fn test_relay_ignores_a_failed_interrupt_listener() {
        let mut streams = StreamMap::new();
        streams.insert("ignite".to_string(), log_stream(&["Node started"]));

        let failed = ready(Err(std::io::Error::other("no signal driver")));
        let outcome = relay_logs(&mut streams, 6, failed).await;
        assert_eq!(outcome, Attach::Finished);
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let err = LaunchError::Configuration(ConfigurationError::Read {
            path: PathBuf::from("ignition.yml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
        assert_eq!(
            error_chain(&err),
            "failed to read descriptor ignition.yml: no such file"
        );
    }
}
