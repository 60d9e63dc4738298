//! Error types for model-graph operations
//!
//! This module provides the error taxonomy for the entity graph. All errors
//! include error codes for categorization so callers can match on the kind of
//! failure instead of string-matching messages.
//!
//! # Error Codes
//!
//! Error codes follow the pattern: `E<category><number>`
//!
//! Categories:
//! - **E1xxx**: argument and structure errors
//! - **E2xxx**: mesh and geometry errors
//! - **E3xxx**: boolean/CSG errors
//! - **E4xxx**: import surface errors
//! - **E5xxx**: cancellation
//!
//! ## Common Error Codes
//!
//! - `E1001`: invalid argument
//! - `E2001`: empty mesh where geometry is required
//! - `E2002`: convex hull computation failure
//! - `E2003`: 2D polygon clipping failure
//! - `E3001`: boolean requested on a multi-volume object
//! - `E3002`: boolean engine failure
//! - `E4001`: unsupported file format
//! - `E4002`: import produced nothing
//! - `E5001`: user-initiated cancellation
//!
//! Contract violations that indicate a bug in the calling code (ID collisions,
//! config-ID mismatches after a copy, use of an invalid-ID entity) are
//! enforced with `debug_assert!` rather than surfaced as `Error` values.

use thiserror::Error;

/// Result type for model-graph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the entity graph and its derived-geometry operations
#[derive(Error, Debug)]
pub enum Error {
    /// An operation received an argument it cannot work with
    ///
    /// **Error Code**: E1001
    ///
    /// **Common Causes**:
    /// - Querying `raw_bounding_box()` on an object with no instances
    /// - An out-of-range volume or instance index
    /// - Grid duplication on a model that does not hold exactly one object
    #[error("[E1001] Invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation that requires geometry was given an empty mesh
    ///
    /// **Error Code**: E2001
    ///
    /// **Common Causes**:
    /// - Computing mass properties of a mesh without triangles
    /// - Splitting a volume whose mesh was already emptied by repair
    #[error("[E2001] Empty mesh: {0}")]
    EmptyMesh(String),

    /// Convex hull computation failed on input the caller required a hull for
    ///
    /// **Error Code**: E2002
    ///
    /// Lazy hull accessors tolerate degenerate input and yield an empty hull;
    /// this variant is reserved for call sites that opted into strictness.
    #[error("[E2002] Convex hull failed: {0}")]
    ConvexHull(String),

    /// A 2D polygon clipping operation failed
    ///
    /// **Error Code**: E2003
    ///
    /// Callers computing best-effort derived polygons (bed area minus
    /// exclusion zones) typically log this and fall back to the unclipped
    /// input.
    #[error("[E2003] Polygon clipping failed: {0}")]
    PolygonClip(String),

    /// A CSG boolean was requested on an object that is not single-volume
    ///
    /// **Error Code**: E3001
    ///
    /// Boolean operations replace the whole volume list with the result
    /// pieces, so they are only defined for objects holding exactly one
    /// volume.
    #[error("[E3001] Boolean requires a single-volume object, found {volumes} volumes")]
    BooleanMultiVolume {
        /// Number of volumes the object currently holds
        volumes: usize,
    },

    /// The mesh-boolean collaborator reported a failure
    ///
    /// **Error Code**: E3002
    #[error("[E3002] Boolean operation failed: {0}")]
    BooleanFailed(String),

    /// A file importer was handed a format it does not understand
    ///
    /// **Error Code**: E4001
    ///
    /// Importer internals live outside this crate; importers surface their
    /// failures through this taxonomy so callers see one error type.
    #[error("[E4001] Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// An import completed without adding any object to the model
    ///
    /// **Error Code**: E4002
    #[error("[E4002] Import produced no objects")]
    NothingLoaded,

    /// The user cancelled a long-running operation
    ///
    /// **Error Code**: E5001
    ///
    /// Kept as a dedicated variant so callers distinguish cancellation from
    /// genuine failure without inspecting message text (the UI suppresses its
    /// error dialog for this kind).
    #[error("[E5001] Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create an InvalidArgument error with operation context
    ///
    /// # Arguments
    /// * `operation` - The operation that rejected its input
    /// * `message` - Description of the problem
    ///
    /// # Example
    /// ```ignore
    /// Error::invalid_argument("raw_bounding_box", "object has no instances")
    /// ```
    pub fn invalid_argument(operation: &str, message: &str) -> Self {
        Error::InvalidArgument(format!("{}: {}", operation, message))
    }

    /// Create an EmptyMesh error naming the entity the mesh belongs to
    ///
    /// # Arguments
    /// * `owner` - A short description of the mesh owner (volume name, object name)
    pub fn empty_mesh(owner: &str) -> Self {
        Error::EmptyMesh(format!("mesh of '{}' has no facets", owner))
    }

    /// True iff this error represents user-initiated cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_in_messages() {
        // Verify error codes are present in error messages
        let invalid = Error::InvalidArgument("test".to_string());
        assert!(invalid.to_string().contains("[E1001]"));

        let empty = Error::EmptyMesh("test".to_string());
        assert!(empty.to_string().contains("[E2001]"));

        let hull = Error::ConvexHull("degenerate input".to_string());
        assert!(hull.to_string().contains("[E2002]"));

        let clip = Error::PolygonClip("open path".to_string());
        assert!(clip.to_string().contains("[E2003]"));

        let multi = Error::BooleanMultiVolume { volumes: 3 };
        assert!(multi.to_string().contains("[E3001]"));
        assert!(multi.to_string().contains("3 volumes"));

        let failed = Error::BooleanFailed("engine exploded".to_string());
        assert!(failed.to_string().contains("[E3002]"));

        let format = Error::UnsupportedFormat("stp".to_string());
        assert!(format.to_string().contains("[E4001]"));

        let nothing = Error::NothingLoaded;
        assert!(nothing.to_string().contains("[E4002]"));

        let cancelled = Error::Cancelled;
        assert!(cancelled.to_string().contains("[E5001]"));
    }

    #[test]
    fn test_invalid_argument_helper() {
        let err = Error::invalid_argument("raw_bounding_box", "object has no instances");
        assert!(err.to_string().contains("raw_bounding_box"));
        assert!(err.to_string().contains("object has no instances"));
        assert!(err.to_string().contains("[E1001]"));
    }

    #[test]
    fn test_empty_mesh_helper() {
        let err = Error::empty_mesh("cube_1");
        assert!(err.to_string().contains("'cube_1'"));
        assert!(err.to_string().contains("[E2001]"));
    }

    #[test]
    fn test_cancelled_is_distinguishable() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::NothingLoaded.is_cancelled());
        assert!(!Error::InvalidArgument("x".into()).is_cancelled());
    }
}
