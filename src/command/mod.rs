mod bootstrap;
mod call;
mod context;
mod login;
mod logout;
mod org;
mod status;

pub use bootstrap::run_bootstrap;
pub use call::run_call;
pub use context::{open_store, CommandContext};
pub use login::{interactive_login, run_login};
pub use logout::run_logout;
pub use org::run_org;
pub use status::run_status;
