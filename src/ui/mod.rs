// UI module - Slint window and its glue to the task core
//
// - GuiController: wires callbacks, settings and the render timer
// - WindowDisplay: the DisplaySink the render loop draws on

// Include the generated Slint code
slint::include_modules!();

pub mod controller;
pub mod display;

pub use controller::GuiController;
pub use display::WindowDisplay;
