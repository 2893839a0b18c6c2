pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliCommand, CliConfig};
pub use config::Settings;

pub use adapters::{InMemoryStateStorage, LocalStateStorage};
pub use core::{
    Executor, ExecutorInput, ExecutorOutput, FunctionRegistry, Node, NodeActor, NodeOptions,
    Registry,
};
pub use utils::error::{LimanError, Result};

/// Greeting of the core library.
pub fn hello() -> &'static str {
    "Hello from Liman Core!"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello() {
        assert_eq!(hello(), "Hello from Liman Core!");
    }

    #[test]
    fn test_hello_is_stable() {
        assert_eq!(hello(), hello());
    }
}
