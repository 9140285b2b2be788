mod color;
mod pager;
mod spinner;
mod status;
mod table;

pub use color::job_label;
pub use pager::print_with_pager;
pub use spinner::{new_spinner, with_spinner};
pub use status::{print_command_status, CommandStatus};
pub use table::{apply_column_padding, header, styled_table};
