use clap::{Args, Parser, Subcommand};

use console_rpc::rpc::Surface;

/// console-rpc - bootstrap and call the console's Auth, Management and Admin APIs
#[derive(Parser)]
#[command(name = "console-rpc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub globals: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args, Clone, Debug)]
pub struct GlobalArgs {
    /// Origin the console is served from (scheme, host and port)
    #[arg(long, env = "CONSOLE_ORIGIN", global = true)]
    pub origin: Option<String>,

    /// Deployment base path of the console
    #[arg(long, env = "CONSOLE_BASE_HREF", default_value = "/", global = true)]
    pub base_href: String,

    /// Read environment.json from this file instead of fetching it from the origin
    #[arg(long, env = "CONSOLE_ENVIRONMENT_FILE", global = true)]
    pub environment_file: Option<String>,

    /// Directory holding the `<lang>.json` translation bundles
    #[arg(long, env = "CONSOLE_I18N_DIR", default_value = "./i18n", global = true)]
    pub i18n_dir: String,

    /// Directory to store session data. Defaults to ~/.console-rpc
    #[arg(long, env = "CONSOLE_CACHE_DIR", global = true)]
    pub cache_dir: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bootstrap and print the derived auth configuration
    Bootstrap,
    /// Call an RPC on one of the API surfaces
    Call {
        /// API surface: auth, mgmt or admin
        surface: Surface,

        /// Method path below the surface prefix, e.g. `orgs/me`
        path: String,

        /// Send a GET instead of a POST
        #[arg(long)]
        get: bool,

        /// JSON request body (POST only)
        #[arg(long, conflicts_with = "get")]
        body: Option<String>,
    },
    /// Log in through the issuer's browser flow
    Login,
    /// Forget the stored credential
    Logout,
    /// Show current session status
    Status,
    /// Select the organization sent with every call
    Org {
        /// Organization id
        #[arg(required_unless_present = "clear")]
        id: Option<String>,

        /// Clear the selection
        #[arg(long, conflicts_with = "id")]
        clear: bool,
    },
}
