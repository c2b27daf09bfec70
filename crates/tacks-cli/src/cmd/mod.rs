pub mod courses;
pub mod sync;
pub mod validate;
pub mod wipe;
