use medley_timeline::StreamMessage;

/// View contract the reconciler drives.
///
/// Handles are opaque to the reconciler: it never reaches into a handle's
/// internals, only hands it back for patching and release. Mounting builds a
/// full view node (expensive); patching updates text/progress on an existing
/// node without rebuilding its interactive parts.
pub trait RenderSink {
    type Handle;

    fn mount(&mut self, message: &StreamMessage) -> Self::Handle;
    fn patch(&mut self, handle: &mut Self::Handle, message: &StreamMessage);
    fn release(&mut self, handle: Self::Handle);
}
