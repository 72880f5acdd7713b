pub mod file_scanner;
pub mod folder_populator;

pub use file_scanner::{diff_walks, scan_albums, AlbumScanner, ScanConfig};
pub use folder_populator::FolderPopulator;
