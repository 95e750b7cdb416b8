// =============================================================================
// FRAME LOOP - one iteration of acquire, record, submit, present, wait
// =============================================================================
//
// FRAME TIMELINE:
// ┌──────────────────────────────────────────────────────────────────────┐
// │  acquire ──> record ──> submit ──> present ──> wait idle             │
// │  (signals     (one       (waits     (waits      (CPU blocks until    │
// │  image_avail) draw)      image_avail, render_   the present queue    │
// │                          signals    finished)   drains)              │
// │                          render_finished)                            │
// └──────────────────────────────────────────────────────────────────────┘
//
// The final wait means no two frames are ever in flight at once, so the
// single semaphore pair can be reused without fences.

use std::fmt;

use crate::error::Result;

/// Steps of a single frame, in the only order they ever run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Acquire,
    Record,
    Submit,
    Present,
    Wait,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStage::Acquire => "acquire",
            FrameStage::Record => "record",
            FrameStage::Submit => "submit",
            FrameStage::Present => "present",
            FrameStage::Wait => "wait",
        };
        f.write_str(name)
    }
}

/// Something that can render and present one frame, step by step
pub trait FrameTarget {
    /// Index of the next swapchain image; blocks until one is available.
    fn acquire(&mut self) -> Result<u32>;

    /// Record the draw for `image_index` into the frame's command buffer.
    fn record(&mut self, image_index: u32) -> Result<()>;

    /// Submit the recorded commands behind the acquire signal.
    fn submit(&mut self) -> Result<()>;

    /// Present `image_index` once rendering has finished.
    fn present(&mut self, image_index: u32) -> Result<()>;

    /// Block until all presentation work has drained.
    fn wait_idle(&mut self) -> Result<()>;
}

/// Run one frame to completion.
///
/// Any failure aborts the frame at that step; later steps are not attempted.
/// Returns the swapchain image index that was presented.
pub fn draw_frame<T: FrameTarget + ?Sized>(target: &mut T) -> Result<u32> {
    log::trace!("frame: {}", FrameStage::Acquire);
    let image_index = target.acquire()?;

    log::trace!("frame: {} image {}", FrameStage::Record, image_index);
    target.record(image_index)?;

    log::trace!("frame: {}", FrameStage::Submit);
    target.submit()?;

    log::trace!("frame: {} image {}", FrameStage::Present, image_index);
    target.present(image_index)?;

    log::trace!("frame: {}", FrameStage::Wait);
    target.wait_idle()?;

    Ok(image_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RendererError, Stage};
    use ash::vk;

    /// Records every call and can be told to fail at one stage
    #[derive(Default)]
    struct MockTarget {
        calls: Vec<(FrameStage, Option<u32>)>,
        image_count: u32,
        next_image: u32,
        fail_at: Option<FrameStage>,
    }

    impl MockTarget {
        fn with_images(image_count: u32) -> Self {
            Self {
                image_count,
                ..Default::default()
            }
        }

        fn step(&mut self, stage: FrameStage, image: Option<u32>) -> Result<()> {
            self.calls.push((stage, image));
            if self.fail_at == Some(stage) {
                let stage = match stage {
                    FrameStage::Acquire => Stage::Acquire,
                    FrameStage::Record => Stage::Record,
                    FrameStage::Submit => Stage::Submit,
                    FrameStage::Present => Stage::Present,
                    FrameStage::Wait => Stage::WaitIdle,
                };
                return Err(RendererError::Vulkan {
                    stage,
                    source: vk::Result::ERROR_DEVICE_LOST,
                });
            }
            Ok(())
        }

        fn stages(&self) -> Vec<FrameStage> {
            self.calls.iter().map(|(stage, _)| *stage).collect()
        }
    }

    impl FrameTarget for MockTarget {
        fn acquire(&mut self) -> Result<u32> {
            let image = self.next_image;
            self.step(FrameStage::Acquire, Some(image))?;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(image)
        }

        fn record(&mut self, image_index: u32) -> Result<()> {
            self.step(FrameStage::Record, Some(image_index))
        }

        fn submit(&mut self) -> Result<()> {
            self.step(FrameStage::Submit, None)
        }

        fn present(&mut self, image_index: u32) -> Result<()> {
            self.step(FrameStage::Present, Some(image_index))
        }

        fn wait_idle(&mut self) -> Result<()> {
            self.step(FrameStage::Wait, None)
        }
    }

    const FULL_FRAME: [FrameStage; 5] = [
        FrameStage::Acquire,
        FrameStage::Record,
        FrameStage::Submit,
        FrameStage::Present,
        FrameStage::Wait,
    ];

    #[test]
    fn stages_run_in_order() {
        let mut target = MockTarget::with_images(2);

        draw_frame(&mut target).unwrap();

        assert_eq!(target.stages(), FULL_FRAME);
    }

    #[test]
    fn acquired_index_flows_to_record_and_present() {
        let mut target = MockTarget::with_images(3);
        target.next_image = 2;

        let presented = draw_frame(&mut target).unwrap();

        assert_eq!(presented, 2);
        assert_eq!(target.calls[1], (FrameStage::Record, Some(2)));
        assert_eq!(target.calls[3], (FrameStage::Present, Some(2)));
    }

    #[test]
    fn next_acquire_only_after_previous_wait() {
        let mut target = MockTarget::with_images(2);

        for _ in 0..3 {
            draw_frame(&mut target).unwrap();
        }

        let stages = target.stages();
        assert_eq!(stages.len(), 15);
        for frame in stages.chunks(5) {
            assert_eq!(frame, FULL_FRAME);
        }

        let images: Vec<u32> = target
            .calls
            .iter()
            .filter(|(stage, _)| *stage == FrameStage::Present)
            .filter_map(|(_, image)| *image)
            .collect();
        assert_eq!(images, vec![0, 1, 0]);
    }

    #[test]
    fn failed_submit_never_presents() {
        let mut target = MockTarget::with_images(2);
        target.fail_at = Some(FrameStage::Submit);

        let err = draw_frame(&mut target).unwrap_err();

        assert!(matches!(err, RendererError::Vulkan { stage: Stage::Submit, .. }));
        assert_eq!(
            target.stages(),
            vec![FrameStage::Acquire, FrameStage::Record, FrameStage::Submit]
        );
    }

    #[test]
    fn failed_acquire_stops_immediately() {
        let mut target = MockTarget::with_images(2);
        target.fail_at = Some(FrameStage::Acquire);

        let err = draw_frame(&mut target).unwrap_err();

        assert!(matches!(err, RendererError::Vulkan { stage: Stage::Acquire, .. }));
        assert_eq!(target.stages(), vec![FrameStage::Acquire]);
    }

    #[test]
    fn stage_names() {
        assert_eq!(FrameStage::Present.to_string(), "present");
        assert_eq!(FrameStage::Wait.to_string(), "wait");
    }
}
