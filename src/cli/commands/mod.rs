mod admins;
mod whoami;

pub use admins::{cmd_add_admin, cmd_init_db, cmd_list_admins, cmd_migrate_admins};
pub use whoami::cmd_whoami;
