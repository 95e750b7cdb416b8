// Backend module - Vulkan abstraction layer
//
// Design: Thin RAII wrappers around ash. Each wrapper holds an Arc to the
// device so nothing can outlive it, and destroys its own handles on drop.

pub mod device;
pub mod pipeline;
pub mod render_pass;
pub mod selection;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use pipeline::Pipeline;
pub use render_pass::{Framebuffers, RenderPass};
pub use swapchain::Swapchain;
pub use sync::FrameSync;

/// Create one object per input, all or nothing.
///
/// If any creation fails, everything created so far is handed to `destroy`
/// before the error is returned, so callers never hold a partial set.
pub(crate) fn create_all<I, T, E>(
    inputs: impl IntoIterator<Item = I>,
    mut create: impl FnMut(I) -> Result<T, E>,
    mut destroy: impl FnMut(T),
) -> Result<Vec<T>, E> {
    let mut created = Vec::new();

    for input in inputs {
        match create(input) {
            Ok(object) => created.push(object),
            Err(e) => {
                for object in created.into_iter().rev() {
                    destroy(object);
                }
                return Err(e);
            }
        }
    }

    Ok(created)
}
