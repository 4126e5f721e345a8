pub mod cat;
pub mod copy;
pub mod info;
pub mod init;
pub mod list;
pub mod remove;
pub mod upload;

pub use cat::cat_command;
pub use copy::{copy_command, put_command};
pub use info::{stat_command, userinfo_command};
pub use init::init_config_command;
pub use list::list_command;
pub use remove::remove_command;
pub use upload::upload_command;
