use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Create or upgrade the user roles table
    Install {
        /// Data directory holding the database and settings
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Recreate the table even if the installed version is current
        #[arg(long)]
        force: bool,
    },

    /// Backfill the user roles table from every user's capabilities
    Migrate {
        /// Data directory holding the database and settings
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Keep existing rows instead of truncating the table first
        #[arg(long, conflicts_with = "truncate")]
        preserve: bool,

        /// Empty the table before migrating (the default)
        #[arg(long)]
        truncate: bool,

        /// Skip the truncation confirmation
        #[arg(long, short)]
        yes: bool,
    },

    /// Show role table status
    Info {
        /// Data directory holding the database and settings
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
