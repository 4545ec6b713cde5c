use std::fmt;

/// Failures while loading reference data at startup. Always fatal.
#[derive(Debug)]
pub enum LoadError {
    /// Source could not be opened or fetched.
    Unreachable { source: String, reason: String },
    /// Source was read but could not be parsed.
    Malformed { source: String, reason: String },
    /// Source parsed but does not have the expected columns/properties/values.
    Schema { source: String, reason: String },
    /// A join key appears more than once in a table that must be keyed by it.
    DuplicateKey { source: String, key: String },
}

impl LoadError {
    pub fn unreachable(source: impl Into<String>, reason: impl fmt::Display) -> Self {
        LoadError::Unreachable { source: source.into(), reason: reason.to_string() }
    }

    pub fn malformed(source: impl Into<String>, reason: impl fmt::Display) -> Self {
        LoadError::Malformed { source: source.into(), reason: reason.to_string() }
    }

    pub fn schema(source: impl Into<String>, reason: impl fmt::Display) -> Self {
        LoadError::Schema { source: source.into(), reason: reason.to_string() }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Unreachable { source, reason } => {
                write!(f, "cannot read {source}: {reason}")
            }
            LoadError::Malformed { source, reason } => {
                write!(f, "malformed data in {source}: {reason}")
            }
            LoadError::Schema { source, reason } => {
                write!(f, "unexpected schema in {source}: {reason}")
            }
            LoadError::DuplicateKey { source, key } => {
                write!(f, "duplicate county '{key}' in {source}")
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// Failures while turning a view selection into a figure. Shown to the user in place of the map.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    UnknownColorScale(String),
    UnknownColumn(String),
    /// The value column has no numeric values in the rows passed to the renderer.
    EmptyColumn(String),
    InvalidSelection { control: &'static str, value: String },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::UnknownColorScale(name) => write!(f, "Unknown color scale: {name}"),
            RenderError::UnknownColumn(name) => write!(f, "Unknown statistic: {name}"),
            RenderError::EmptyColumn(name) => {
                write!(f, "No values for {name} in the selected region")
            }
            RenderError::InvalidSelection { control, value } => {
                write!(f, "Invalid {control} selection: {value}")
            }
        }
    }
}

impl std::error::Error for RenderError {}
