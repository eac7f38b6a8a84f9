// This runs the agent on windows without creating a console. Disable during development to see
// stdout.
#![cfg_attr(feature = "win", windows_subsystem = "windows")]

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use workpulse::{
    agent::{args::AgentArgs, start_agent, AgentConfig},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, AGENT_PREFIX},
        runtime::single_thread_runtime,
    },
};

fn main() -> Result<()> {
    let args = AgentArgs::parse();
    println!(
        "Option provided are\nHost : {}\nInterval : {}\nIdle Time: {}",
        args.host, args.interval, args.idletime
    );

    let app_dir = match &args.dir {
        Some(dir) => std::path::absolute(dir)?,
        None => create_application_default_path()?,
    };

    if args.detach {
        #[cfg(unix)]
        {
            use daemonize::Daemonize;

            let daemonize = Daemonize::new()
                .stdout(daemonize::Stdio::devnull())
                .stderr(daemonize::Stdio::devnull())
                .execute();
            match daemonize {
                daemonize::Outcome::Parent(parent) => {
                    parent?;
                    println!("Created daemon");
                    return Ok(());
                }
                daemonize::Outcome::Child(child) => {
                    child?;
                }
            }
        }
        #[cfg(not(unix))]
        {
            eprintln!("--detach is only supported on unix, running in foreground");
        }
    }

    run(args, app_dir)
}

fn run(args: AgentArgs, app_dir: std::path::PathBuf) -> Result<()> {
    enable_logging(AGENT_PREFIX, &app_dir.join("logs"), args.log, args.log_console)?;
    let config = AgentConfig {
        dir: app_dir,
        host: args.host,
        interval: Duration::from_secs(args.interval),
        idle_threshold_s: args.idletime,
    };
    single_thread_runtime()?.block_on(async move { start_agent(config).await })
        .inspect_err(|e| tracing::error!("Agent stopped with an error {e:?}"))?;
    Ok(())
}
