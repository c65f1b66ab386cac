use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use cxprof::{
    commands,
    paths::Paths,
    ui::{ColorMode, Ui},
};

#[derive(Parser)]
#[command(name = "cxprof")]
#[command(about = "Codex Profile Switcher - keep multiple ~/.codex accounts and share sessions between them")]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    /// Log debug details to stderr (overridden by CXPROF_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Without a subcommand, pick a profile interactively
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all saved profiles
    #[command(visible_alias = "ls")]
    List,

    /// Show the current and previous profile
    Current,

    /// Show detailed information about a profile
    Inspect {
        /// Name of the profile to inspect
        name: String,
    },

    /// Save the live ~/.codex as a profile (replaces an existing one)
    Save {
        /// Name of the profile to save
        name: String,
    },

    /// Switch ~/.codex to a saved profile
    #[command(visible_aliases = ["switch", "sw"])]
    Use {
        /// Name of the profile to activate
        name: String,
    },

    /// Delete a saved profile
    Remove {
        /// Name of the profile to remove
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Manage session sharing between profiles
    #[command(subcommand)]
    Share(ShareCommands),

    /// Run diagnostics on the cxprof setup
    Doctor,

    /// Print shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ShareCommands {
    /// Share sessions and history between profiles (auth stays private)
    Enable {
        /// Also share config.toml and settings.json
        #[arg(long)]
        include_settings: bool,

        /// Share only within groups assigned with `share group`
        #[arg(long)]
        groups: bool,
    },

    /// Copy shared data back into ~/.codex and stop sharing
    Disable {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the sharing mode and the state of each shared item
    Status,

    /// Put a profile into a sharing group
    Group {
        /// Profile name
        account: String,
        /// Group name
        group: String,
    },

    /// Remove a profile from its sharing group
    Ungroup {
        /// Profile name
        account: String,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("CXPROF_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("cxprof={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(Commands::Completions { shell }) = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "cxprof", &mut std::io::stdout());
        return Ok(());
    }

    let paths = Paths::new()?;
    let ui = Ui::new(cli.color, cli.no_color);

    let Some(command) = cli.command else {
        return commands::pick(&paths, &ui);
    };

    match command {
        Commands::List => commands::list(&paths, &ui),
        Commands::Current => commands::current(&paths, &ui),
        Commands::Inspect { name } => commands::inspect(&paths, &name, &ui),
        Commands::Save { name } => commands::save(&paths, &name, &ui),
        Commands::Use { name } => commands::use_profile(&paths, &name, &ui),
        Commands::Remove { name, force } => commands::remove(&paths, &name, &ui, force),
        Commands::Share(share) => match share {
            ShareCommands::Enable {
                include_settings,
                groups,
            } => commands::share_enable(&paths, &ui, include_settings, groups),
            ShareCommands::Disable { yes } => commands::share_disable(&paths, &ui, yes),
            ShareCommands::Status => commands::share_status(&paths, &ui),
            ShareCommands::Group { account, group } => {
                commands::share_group(&paths, &ui, &account, &group)
            }
            ShareCommands::Ungroup { account } => commands::share_ungroup(&paths, &ui, &account),
        },
        Commands::Doctor => commands::doctor(&paths, &ui),
        Commands::Completions { .. } => Ok(()),
    }
}
