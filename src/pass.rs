//! Pass descriptors and the recording context.

use ash::vk;

/// Capability object handed to a pass's recording callback.
///
/// Recording is fully synchronous: by the time the callback runs, every
/// declared input is in shader-read state and every declared output is bound
/// as an attachment inside an open dynamic rendering scope.
pub struct RecordContext<'a> {
    pub(crate) device: &'a ash::Device,
    pub(crate) cmd: vk::CommandBuffer,
}

impl RecordContext<'_> {
    /// The device, for issuing `cmd_*` calls.
    pub fn device(&self) -> &ash::Device {
        self.device
    }

    /// The command buffer the frame is being recorded into.
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }
}

/// Boxed recording callback invoked once per pass per frame.
pub type RecordCallback = Box<dyn FnMut(&RecordContext<'_>)>;

/// A declared pass: name, read/write sets, clear policy, record callback.
///
/// Passes execute in the exact order they are added to the graph; the caller
/// is responsible for declaring them in a valid order and for declaring true
/// read/write sets.
///
/// # Example
///
/// ```ignore
/// graph.add_pass(
///     GraphPass::new("lighting")
///         .reads("gbuffer_albedo")
///         .reads("gbuffer_normal")
///         .writes("hdr")
///         .record(|ctx| {
///             // bind pipeline, push constants with bindless indices, draw
///         }),
/// );
/// ```
pub struct GraphPass {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    clear_outputs: bool,
    pub(crate) callback: Option<RecordCallback>,
}

impl GraphPass {
    /// Create a new pass. Outputs are cleared by default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            clear_outputs: true,
            callback: None,
        }
    }

    /// Declare a resource this pass samples (read-only).
    pub fn reads(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    /// Declare a resource this pass writes as an attachment.
    pub fn writes(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    /// Load existing attachment contents instead of clearing them.
    ///
    /// Used by overlay passes (e.g. UI) drawing on top of earlier results.
    pub fn load_outputs(mut self) -> Self {
        self.clear_outputs = false;
        self
    }

    /// Set the recording callback.
    pub fn record(mut self, callback: impl FnMut(&RecordContext<'_>) + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Get the pass name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared input resource names, in declaration order.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Declared output resource names, in declaration order.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Whether outputs are cleared (true) or loaded (false) at pass start.
    pub fn clears_outputs(&self) -> bool {
        self.clear_outputs
    }
}

impl std::fmt::Debug for GraphPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphPass")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("clear_outputs", &self.clear_outputs)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_builder() {
        let pass = GraphPass::new("lighting")
            .reads("gbuffer_albedo")
            .reads("gbuffer_normal")
            .writes("hdr");

        assert_eq!(pass.name(), "lighting");
        assert_eq!(pass.inputs(), ["gbuffer_albedo", "gbuffer_normal"]);
        assert_eq!(pass.outputs(), ["hdr"]);
        assert!(pass.clears_outputs());
    }

    #[test]
    fn test_load_outputs() {
        let pass = GraphPass::new("ui").writes("swap").load_outputs();
        assert!(!pass.clears_outputs());
    }

    #[test]
    fn test_record_callback_is_stored() {
        let pass = GraphPass::new("empty");
        assert!(pass.callback.is_none());

        let pass = GraphPass::new("draw").record(|_ctx| {});
        assert!(pass.callback.is_some());
    }
}
