mod category;
mod media;
mod show;

pub use category::Category;
pub use media::{Genre, MediaKind};
pub use show::{PersonalPatch, ShowKey, ShowMetadata, ShowRecord};
