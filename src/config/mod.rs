pub mod settings;

pub use settings::MuxSettings;
