//! # Munging Error Types
//!
//! Everything that can stop a geometry batch from being converted for a
//! device. None of these escape the draw unit: the pipeline logs them and
//! swaps in a flash state instead.

use cullpass_shared::{InternalName, PrimitiveType, VertexDataError};
use thiserror::Error;

/// Which side of the pipeline a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The input data is malformed; fixable on the CPU side.
    Cpu,
    /// The device cannot express what the data needs.
    Hardware,
}

/// Errors that can occur while munging a geometry batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MungeError {
    /// Vertex columns are missing or inconsistent.
    #[error("malformed vertex data: {0}")]
    MalformedData(#[from] VertexDataError),

    /// The primitive references a row that does not exist.
    #[error("vertex index {index} out of range for {rows} rows")]
    IndexOutOfRange {
        /// The bad index.
        index: u32,
        /// Rows available.
        rows: usize,
    },

    /// The device cannot draw this primitive type and there is no fallback.
    #[error("device does not support {} primitives", .0.name())]
    UnsupportedPrimitive(PrimitiveType),

    /// The batch needs more texture-coordinate sets than the profile has.
    #[error("{count} texcoord sets exceed the profile limit of {limit}")]
    TooManyTexcoordSets {
        /// Sets required.
        count: usize,
        /// Sets the profile supports.
        limit: usize,
    },

    /// The batch is too large for one draw call.
    #[error("{count} vertices exceed the device limit of {limit}")]
    TooManyVertices {
        /// Vertices required.
        count: usize,
        /// Device limit.
        limit: usize,
    },

    /// A column has a shape the target layout cannot encode.
    #[error("column `{name}` cannot be encoded by the {munger} munger")]
    UnencodableColumn {
        /// Offending column.
        name: InternalName,
        /// Munger that rejected it.
        munger: &'static str,
    },
}

impl MungeError {
    /// The failure class, which picks the flash state.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::MalformedData(_) | Self::IndexOutOfRange { .. } => FailureClass::Cpu,
            Self::UnsupportedPrimitive(_)
            | Self::TooManyTexcoordSets { .. }
            | Self::TooManyVertices { .. }
            | Self::UnencodableColumn { .. } => FailureClass::Hardware,
        }
    }
}

/// Result type for munging operations.
pub type MungeResult<T> = Result<T, MungeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classes() {
        assert_eq!(
            MungeError::IndexOutOfRange { index: 9, rows: 3 }.class(),
            FailureClass::Cpu
        );
        assert_eq!(
            MungeError::UnsupportedPrimitive(PrimitiveType::Lines).class(),
            FailureClass::Hardware
        );
    }

    #[test]
    fn test_messages() {
        let err = MungeError::UnsupportedPrimitive(PrimitiveType::TriangleFan);
        assert_eq!(err.to_string(), "device does not support triangle fan primitives");

        let err = MungeError::from(VertexDataError::MissingVertexColumn);
        assert_eq!(
            err.to_string(),
            "malformed vertex data: vertex data has no `vertex` column"
        );
    }
}
