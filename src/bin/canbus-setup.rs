// canbus-setup/src/bin/canbus-setup.rs
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Command line tool to set up and troubleshoot a CAN interface for
//! Klipper.
//!
//! Without a subcommand it runs the interactive menus.

use anyhow::{anyhow, Context, Result};
use canbus_setup::{
    apply_configuration, detect, remove_configuration, Activation, Bitrate, Config, Console,
    DesiredParameters, Host, Scheme, Session, TxQueueLen,
};
use clap::{arg, value_parser, ArgAction, ArgMatches, Command};
use std::{
    io::{self, Write},
    path::PathBuf,
    process,
};

// Make the app version the same as the package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

// --------------------------------------------------------------------------

/// Sets up logging at a level from the number of `-v` flags.
///
/// `RUST_LOG` wins over the flags.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Builds the runtime configuration from the global options.
fn config_from(opts: &ArgMatches) -> Result<Config> {
    let mut config = Config::default();

    if let Some(root) = opts.get_one::<PathBuf>("root") {
        config = config.root(root);
    }
    if let Some(iface) = opts.get_one::<String>("iface") {
        config = config.iface(iface)?;
    }
    if let Some(dir) = opts.get_one::<PathBuf>("klipper-dir") {
        config = config.klipper_dir(dir);
    }
    if let Some(dir) = opts.get_one::<PathBuf>("klippy-env") {
        config = config.klippy_env(dir);
    }
    Ok(config)
}

/// Creates a session on the terminal.
fn session(config: Config) -> Session<Host, io::StdinLock<'static>, io::Stdout> {
    Session::new(Host::new(), config, Console::new(io::stdin().lock(), io::stdout()))
}

// --------------------------------------------------------------------------

/// Process the 'apply' subcommand.
fn apply_cmd(config: &Config, opts: &ArgMatches) -> Result<()> {
    let scheme = opts.get_one::<String>("scheme").unwrap().parse::<Scheme>()?;
    let bitrate = opts.get_one::<String>("bitrate").unwrap().parse::<Bitrate>()?;
    let txqueuelen = opts
        .get_one::<String>("txqueuelen")
        .unwrap()
        .parse::<TxQueueLen>()?;
    let desired = DesiredParameters::new(bitrate, txqueuelen);

    let applied = apply_configuration(&mut Host::new(), &config.layout(), scheme, &desired)
        .with_context(|| format!("Failed to apply the {} configuration", scheme))?;

    println!("Configured '{}' using {}: {}", config.iface, scheme, applied.persisted);
    if applied.activation == Activation::RebootRequired {
        println!("Reboot for the configuration to take effect.");
    }
    Ok(())
}

/// Process the 'remove' subcommand.
fn remove_cmd(config: &Config) -> Result<()> {
    let removed = remove_configuration(&mut Host::new(), &config.layout())
        .context("Failed to remove the configuration")?;

    if removed.is_empty() {
        println!("No configuration files found.");
    }
    for path in removed {
        println!("Removed {}", path.display());
    }
    Ok(())
}

/// Dispatch the subcommand, if any.
fn run(config: Config, opts: &ArgMatches) -> Result<()> {
    use canbus_setup::menu::Action;

    match opts.subcommand() {
        None | Some(("menu", _)) => session(config).run()?,
        Some(("detect", _)) => {
            let detection = detect(&config.layout());
            println!("{}", detection);
            if detection.is_warning() {
                return Err(anyhow!("The CAN configuration needs attention"));
            }
        }
        Some(("show", _)) => {
            let mut session = session(config);
            session.perform(Action::Validate)?;
            session.perform(Action::ViewFiles)?;
        }
        Some(("status", _)) => session(config).perform(Action::Status)?,
        Some(("apply", sub_opts)) => apply_cmd(&config, sub_opts)?,
        Some(("remove", _)) => remove_cmd(&config)?,
        Some((cmd, _)) => return Err(anyhow!("Unknown subcommand '{}'", cmd)),
    }
    io::stdout().flush()?;
    Ok(())
}

// --------------------------------------------------------------------------

fn main() {
    let opts = Command::new("canbus-setup")
        .version(VERSION)
        .about("Set up and troubleshoot a Linux CAN interface for Klipper")
        .disable_help_flag(true)
        .arg(
            arg!(--help "Print help information")
                .short('?')
                .action(ArgAction::Help)
                .global(true),
        )
        .arg(
            arg!(-i --iface <iface> "The CAN interface to configure, like 'can0'")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(--root <dir> "Write the configuration under this directory instead of '/'")
                .required(false)
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            arg!(--"klipper-dir" <dir> "The Klipper source directory [default: ~/klipper]")
                .required(false)
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            arg!(--"klippy-env" <dir> "The Klipper virtualenv [default: ~/klippy-env]")
                .required(false)
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            arg!(-v --verbose "Log more details (repeat for even more)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(Command::new("menu").about("Run the interactive menus (the default)"))
        .subcommand(Command::new("detect").about("Print the installed configuration method"))
        .subcommand(
            Command::new("show").about("Validate and print the installed configuration"),
        )
        .subcommand(Command::new("status").about("Print the live status of the interface"))
        .subcommand(
            Command::new("apply")
                .about("Write, activate and verify a configuration")
                .arg(
                    arg!(<scheme> "The configuration method: 'legacy', 'a' or 'b'")
                        .required(true),
                )
                .arg(
                    arg!(<bitrate> "The bitrate, 125000 to 1000000 in steps of 125000")
                        .required(true),
                )
                .arg(
                    arg!(<txqueuelen> "The transmit queue length, 128 to 1024 in steps of 128")
                        .required(true),
                ),
        )
        .subcommand(Command::new("remove").about("Remove every known configuration"))
        .get_matches();

    init_logging(opts.get_count("verbose"));

    let config = match config_from(&opts) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(2);
        }
    };

    if config.is_system_root() && !nix::unistd::geteuid().is_root() {
        eprintln!("Warning: not running as root; changing the configuration will fail.");
    }

    // Ctrl-C stops a running capture, and otherwise leaves the program
    let handler = || {
        if canbus_setup::system::foreground_running() {
            log::debug!("Interrupted the foreground program");
        } else {
            println!();
            process::exit(130);
        }
    };
    if let Err(err) = ctrlc::set_handler(handler) {
        log::warn!("Unable to install the Ctrl-C handler: {}", err);
    }

    if let Err(err) = run(config, &opts) {
        eprintln!("{:#}", err);
        process::exit(1);
    }
}
