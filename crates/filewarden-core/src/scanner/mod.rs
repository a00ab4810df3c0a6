pub mod ignore;
pub mod walk;

pub use ignore::{is_ignorable, is_ignorable_dir, is_ignorable_name};
pub use walk::{scan_folder, scan_folders, FolderScan, ScanRequest};
