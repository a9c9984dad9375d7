use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Unknown scenario '{name}'.")]
    UnknownScenario { name: String },
    #[error(
        "Unresolved symbols: screens [{}], scenarios [{}].",
        .screens.join(", "),
        .scenarios.join(", ")
    )]
    UnresolvedSymbols {
        screens: Vec<String>,
        scenarios: Vec<String>,
    },
    #[error("Registry has no scenarios.")]
    NoScenarios,
}
