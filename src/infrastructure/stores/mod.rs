pub mod filesystem;
pub mod settings;

pub use filesystem::FilesystemStore;
pub use settings::FilesystemSettings;
