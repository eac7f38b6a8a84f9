use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;


#[derive(Parser, Debug)]
#[command(name = "workpulse", version, long_about = None)]
#[command(about = "Tracks workstation activity per day and reports it to a collection service")]
pub struct AgentArgs {
  /// Host (host[:port] or url) of the collection service the stats are sent to.
  #[arg(long)]
  pub host: String,
  /// Seconds between two aggregation ticks and between two persistence ticks.
  #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
  pub interval: u64,
  /// Seconds of inactivity after which idle time starts accumulating.
  #[arg(long, default_value_t = 120)]
  pub idletime: u64,
  /// Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state
  #[arg(long)]
  pub dir: Option<PathBuf>,
  /// Detach from the terminal and keep running in the background.
  #[arg(long)]
  pub detach: bool,
  /// This option is for debugging purposes only.
  #[arg(long = "log-console")]
  pub log_console : bool,
  #[arg(long = "log-filter")]
  pub log: Option<LevelFilter>
}
