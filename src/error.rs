//! Graphics error types.

use thiserror::Error;

/// Errors that can occur in the bindless registry or the render graph.
///
/// All of these are unrecoverable for the current frame (or, for descriptor
/// capacity and binding errors, for the process): callers are expected to
/// fail loudly rather than skip a barrier or wrap an index around.
#[derive(Error, Debug)]
pub enum GraphicsError {
    /// A bindless binding has no free descriptor index left.
    #[error("bindless binding {binding} is full ({capacity} descriptors)")]
    DescriptorCapacityExhausted { binding: u32, capacity: u32 },
    /// A storage buffer was registered against a binding outside 1..=3.
    #[error("invalid storage buffer binding {0} (expected 1, 2 or 3)")]
    InvalidBufferBinding(u32),
    /// A pass references a resource name absent from the resource table.
    #[error("render graph references unknown resource '{0}'")]
    UnknownResource(String),
    /// A pass declares more than one depth-formatted output.
    #[error("pass '{0}' declares more than one depth output")]
    MultipleDepthOutputs(String),
    /// A pass reads an internal resource that no earlier pass has written.
    #[error("pass '{pass}' reads '{resource}' before any pass writes it")]
    InputNeverWritten { pass: String, resource: String },
    /// A device-level operation failed.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::DescriptorCapacityExhausted {
            binding: 0,
            capacity: 10_000,
        };
        assert_eq!(err.to_string(), "bindless binding 0 is full (10000 descriptors)");

        let err = GraphicsError::UnknownResource("gbuffer_albedo".to_string());
        assert_eq!(
            err.to_string(),
            "render graph references unknown resource 'gbuffer_albedo'"
        );

        let err = GraphicsError::InvalidBufferBinding(0);
        assert_eq!(
            err.to_string(),
            "invalid storage buffer binding 0 (expected 1, 2 or 3)"
        );
    }
}
