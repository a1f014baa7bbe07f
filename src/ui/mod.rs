pub mod app;
pub mod draw;
pub mod output;
pub mod panel;
pub mod theme;
