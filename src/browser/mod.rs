pub mod headless;
pub mod interceptor;
pub mod network;

pub use headless::{launch_headless_browser, ChromeDriver, ChromeSession};
