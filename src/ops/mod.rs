pub mod clipboard;
pub mod fill;
pub mod line_art;
pub mod shapes;
pub mod text;
pub mod transform;
