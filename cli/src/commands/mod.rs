mod habit;
mod helpers;
mod log;
mod show;
mod sync;

pub(crate) use habit::{cmd_add, cmd_delete, cmd_edit, cmd_list};
pub(crate) use log::{cmd_done, cmd_skip};
pub(crate) use show::cmd_show;
pub(crate) use sync::{cmd_remote_clear, cmd_remote_set, cmd_remote_show, cmd_status, cmd_sync};
