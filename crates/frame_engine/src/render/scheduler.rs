//! Frame-in-flight scheduling
//!
//! [`FrameScheduler`] runs the per-frame sequence against a [`FrameBackend`]: wait for
//! and reset the slot's fence, acquire an image, record, submit, present, then advance
//! to the next slot. It also tracks which slot last submitted each swapchain image. An
//! image whose previous submission came from a different slot waits on that slot's
//! fence before its command buffer is re-recorded. A frame that fails after its fence
//! was reset stops the scheduler, since that fence would never signal again.

use super::vulkan::{VulkanError, VulkanResult};

/// Where a frame slot is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Not part of the frame being built
    Idle,
    /// Fence waited and reset, waiting for a swapchain image
    Acquiring,
    /// Command buffer and uniforms being written
    Recording,
    /// Command buffer being handed to the graphics queue
    Submitted,
    /// Image handed to the presentation engine
    Presenting,
}

/// GPU operations the scheduler drives, one call per step
pub trait FrameBackend {
    /// Block until the last submission made from `slot` has completed
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()>;
    /// Unsignal the fence of `slot` so the next submission can signal it
    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()>;
    /// Acquire a swapchain image, signaling the slot's image-available semaphore
    fn acquire_image(&mut self, slot: usize) -> VulkanResult<u32>;
    /// Re-record the image's command buffer and rewrite its uniform buffer
    fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;
    /// Submit the image's command buffer with the slot's semaphores and fence
    fn submit(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;
    /// Present the image once the slot's render-finished semaphore is signaled
    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;
}

/// Outcome of one scheduled frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Sequence number, starting at zero
    pub frame_number: u64,
    /// Slot used
    pub slot: usize,
    /// Swapchain image drawn into
    pub image_index: u32,
}

/// Per-frame state machine over `N` frame slots
#[derive(Debug)]
pub struct FrameScheduler {
    current_frame: usize,
    states: Vec<SlotState>,
    in_flight: Vec<bool>,
    image_owner: Vec<Option<usize>>,
    frame_number: u64,
    failed: bool,
}

impl FrameScheduler {
    /// Create a scheduler for `frames_in_flight` slots and `image_count` images
    pub fn new(frames_in_flight: usize, image_count: usize) -> VulkanResult<Self> {
        if frames_in_flight == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "at least one frame in flight is required".to_string(),
            });
        }
        Ok(Self {
            current_frame: 0,
            states: vec![SlotState::Idle; frames_in_flight],
            in_flight: vec![false; frames_in_flight],
            image_owner: vec![None; image_count],
            frame_number: 0,
            failed: false,
        })
    }

    /// Number of slots
    pub fn frames_in_flight(&self) -> usize {
        self.states.len()
    }

    /// Slot the next frame will use
    pub const fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// State of `slot`
    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.states.get(slot).copied()
    }

    /// Submissions not yet observed complete through a fence wait
    pub fn outstanding(&self) -> usize {
        self.in_flight.iter().filter(|&&busy| busy).count()
    }

    /// Whether a frame failed after its fence was reset
    ///
    /// That fence has nothing pending to signal it, so every later frame is refused
    /// instead of waiting on it forever.
    pub const fn has_failed(&self) -> bool {
        self.failed
    }

    /// Run one frame
    ///
    /// On error the failing slot keeps the state it reached and the frame index does
    /// not advance. Errors after the fence reset leave the scheduler failed.
    pub fn draw_frame<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> VulkanResult<FrameInfo> {
        if self.failed {
            return Err(VulkanError::InvalidOperation {
                reason: format!("frame scheduling stopped after frame {} failed", self.frame_number),
            });
        }
        let slot = self.current_frame;

        backend.wait_for_slot(slot)?;
        self.in_flight[slot] = false;

        let image_index = match self.run_slot(backend, slot) {
            Ok(image_index) => image_index,
            Err(err) => {
                self.failed = true;
                return Err(err);
            }
        };

        let info = FrameInfo {
            frame_number: self.frame_number,
            slot,
            image_index,
        };
        log::trace!("Frame {} used slot {} / image {}", info.frame_number, slot, image_index);

        self.frame_number += 1;
        self.current_frame = (self.current_frame + 1) % self.states.len();
        Ok(info)
    }

    /// Reset the slot's fence and take it from acquire to present
    fn run_slot<B: FrameBackend + ?Sized>(&mut self, backend: &mut B, slot: usize) -> VulkanResult<u32> {
        backend.reset_slot(slot)?;
        self.states[slot] = SlotState::Acquiring;

        let image_index = backend.acquire_image(slot)?;
        let image = image_index as usize;
        if image >= self.image_owner.len() {
            self.image_owner.resize(image + 1, None);
        }
        if let Some(owner) = self.image_owner[image] {
            if owner != slot && self.in_flight[owner] {
                log::trace!("Image {} still in use by slot {}, waiting", image_index, owner);
                backend.wait_for_slot(owner)?;
                self.in_flight[owner] = false;
            }
        }

        self.states[slot] = SlotState::Recording;
        backend.record(slot, image_index)?;

        self.states[slot] = SlotState::Submitted;
        backend.submit(slot, image_index)?;
        self.in_flight[slot] = true;
        self.image_owner[image] = Some(slot);

        self.states[slot] = SlotState::Presenting;
        backend.present(slot, image_index)?;
        self.states[slot] = SlotState::Idle;

        Ok(image_index)
    }

    /// Mark every slot idle after the device has been waited on
    pub fn mark_device_idle(&mut self) {
        self.states.fill(SlotState::Idle);
        self.in_flight.fill(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use std::collections::{HashSet, VecDeque};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Reset(usize),
        Acquire(usize),
        Record(usize, u32),
        Submit(usize, u32),
        Present(usize, u32),
    }

    /// In-order GPU that only retires work when the CPU waits on a fence
    struct SimulatedGpu {
        image_count: u32,
        next_image: u32,
        queue: VecDeque<(usize, u32)>,
        unsignaled: HashSet<usize>,
        max_outstanding: usize,
        calls: Vec<Call>,
        fail_acquire: bool,
        fail_submit: bool,
        fail_present: bool,
    }

    impl SimulatedGpu {
        fn new(image_count: u32) -> Self {
            Self {
                image_count,
                next_image: 0,
                queue: VecDeque::new(),
                unsignaled: HashSet::new(),
                max_outstanding: 0,
                calls: Vec::new(),
                fail_acquire: false,
                fail_submit: false,
                fail_present: false,
            }
        }

        fn slot_busy(&self, slot: usize) -> bool {
            self.queue.iter().any(|&(s, _)| s == slot)
        }

        fn image_busy(&self, image: u32) -> bool {
            self.queue.iter().any(|&(_, i)| i == image)
        }
    }

    impl FrameBackend for SimulatedGpu {
        fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.calls.push(Call::Wait(slot));
            assert!(
                self.slot_busy(slot) || !self.unsignaled.contains(&slot),
                "slot {slot} waits on a reset fence with nothing submitted, which never returns"
            );
            while self.slot_busy(slot) {
                if let Some((done, _)) = self.queue.pop_front() {
                    self.unsignaled.remove(&done);
                }
            }
            Ok(())
        }

        fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
            assert!(!self.slot_busy(slot), "fence reset while its submission is pending");
            self.calls.push(Call::Reset(slot));
            self.unsignaled.insert(slot);
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> VulkanResult<u32> {
            self.calls.push(Call::Acquire(slot));
            if self.fail_acquire {
                self.fail_acquire = false;
                return Err(VulkanError::frame("Acquire next image")(vk::Result::ERROR_SURFACE_LOST_KHR));
            }
            let image = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(image)
        }

        fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            assert!(!self.slot_busy(slot), "slot {slot} re-recorded while executing");
            assert!(!self.image_busy(image_index), "image {image_index} command buffer re-recorded while executing");
            self.calls.push(Call::Record(slot, image_index));
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            self.calls.push(Call::Submit(slot, image_index));
            if self.fail_submit {
                return Err(VulkanError::frame("Submit frame")(vk::Result::ERROR_DEVICE_LOST));
            }
            self.queue.push_back((slot, image_index));
            self.max_outstanding = self.max_outstanding.max(self.queue.len());
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            self.calls.push(Call::Present(slot, image_index));
            if self.fail_present {
                return Err(VulkanError::frame("Present image")(vk::Result::ERROR_OUT_OF_DATE_KHR));
            }
            Ok(())
        }
    }

    #[test]
    fn test_outstanding_submissions_never_exceed_frames_in_flight() {
        for frames in 1..=4 {
            for images in 1..=5u32 {
                let mut gpu = SimulatedGpu::new(images);
                let mut scheduler = FrameScheduler::new(frames, images as usize).unwrap();
                for _ in 0..50 {
                    scheduler.draw_frame(&mut gpu).unwrap();
                    assert!(scheduler.outstanding() <= frames);
                }
                assert!(
                    gpu.max_outstanding <= frames,
                    "{} submissions outstanding with {} frames in flight and {} images",
                    gpu.max_outstanding,
                    frames,
                    images
                );
            }
        }
    }

    #[test]
    fn test_frame_sequence_order() {
        let mut gpu = SimulatedGpu::new(3);
        let mut scheduler = FrameScheduler::new(2, 3).unwrap();
        scheduler.draw_frame(&mut gpu).unwrap();

        assert_eq!(
            gpu.calls,
            vec![
                Call::Wait(0),
                Call::Reset(0),
                Call::Acquire(0),
                Call::Record(0, 0),
                Call::Submit(0, 0),
                Call::Present(0, 0),
            ]
        );
    }

    #[test]
    fn test_frame_index_wraps() {
        let mut gpu = SimulatedGpu::new(3);
        let mut scheduler = FrameScheduler::new(2, 3).unwrap();
        let slots: Vec<usize> = (0..5).map(|_| scheduler.draw_frame(&mut gpu).unwrap().slot).collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(scheduler.current_frame(), 1);
        assert_eq!(scheduler.frames_in_flight(), 2);
    }

    #[test]
    fn test_image_index_independent_of_slot() {
        let mut gpu = SimulatedGpu::new(3);
        let mut scheduler = FrameScheduler::new(2, 3).unwrap();
        let frames: Vec<(usize, u32)> = (0..4)
            .map(|_| {
                let info = scheduler.draw_frame(&mut gpu).unwrap();
                (info.slot, info.image_index)
            })
            .collect();
        assert_eq!(frames, vec![(0, 0), (1, 1), (0, 2), (1, 0)]);
    }

    #[test]
    fn test_waits_for_other_slot_holding_the_image() {
        // Two images, three slots: image 0 comes back while slot 0 may still own it.
        let mut gpu = SimulatedGpu::new(2);
        let mut scheduler = FrameScheduler::new(3, 2).unwrap();
        scheduler.draw_frame(&mut gpu).unwrap();
        scheduler.draw_frame(&mut gpu).unwrap();
        gpu.calls.clear();

        let info = scheduler.draw_frame(&mut gpu).unwrap();
        assert_eq!((info.slot, info.image_index), (2, 0));
        assert_eq!(
            &gpu.calls[..4],
            &[Call::Wait(2), Call::Reset(2), Call::Acquire(2), Call::Wait(0)],
            "image 0 was last submitted by slot 0, so its fence is waited on"
        );
    }

    #[test]
    fn test_slots_idle_between_frames() {
        let mut gpu = SimulatedGpu::new(2);
        let mut scheduler = FrameScheduler::new(2, 2).unwrap();
        scheduler.draw_frame(&mut gpu).unwrap();
        assert_eq!(scheduler.slot_state(0), Some(SlotState::Idle));
        assert_eq!(scheduler.outstanding(), 1);

        scheduler.mark_device_idle();
        assert_eq!(scheduler.outstanding(), 0);
    }

    #[test]
    fn test_present_failure_is_reported_and_frame_does_not_advance() {
        let mut gpu = SimulatedGpu::new(2);
        gpu.fail_present = true;
        let mut scheduler = FrameScheduler::new(2, 2).unwrap();

        let err = scheduler.draw_frame(&mut gpu).unwrap_err();
        assert_eq!(err.kind(), crate::render::vulkan::ErrorKind::Frame);
        assert_eq!(scheduler.slot_state(0), Some(SlotState::Presenting));
        assert_eq!(scheduler.current_frame(), 0);
    }

    #[test]
    fn test_failed_acquire_refuses_later_frames_instead_of_waiting() {
        let mut gpu = SimulatedGpu::new(2);
        gpu.fail_acquire = true;
        let mut scheduler = FrameScheduler::new(1, 2).unwrap();

        let err = scheduler.draw_frame(&mut gpu).unwrap_err();
        assert_eq!(err.kind(), crate::render::vulkan::ErrorKind::Frame);
        assert!(scheduler.has_failed());
        assert_eq!(scheduler.slot_state(0), Some(SlotState::Acquiring));

        // Slot 0's fence is reset with nothing pending; waiting on it would hang.
        gpu.calls.clear();
        let retry = scheduler.draw_frame(&mut gpu).unwrap_err();
        assert!(matches!(retry, VulkanError::InvalidOperation { .. }));
        assert!(gpu.calls.is_empty(), "no backend call after a failed frame: {:?}", gpu.calls);
    }

    #[test]
    fn test_submit_failure_is_distinguishable_from_present_failure() {
        let mut gpu = SimulatedGpu::new(2);
        gpu.fail_submit = true;
        let mut scheduler = FrameScheduler::new(2, 2).unwrap();

        assert!(scheduler.draw_frame(&mut gpu).is_err());
        assert_eq!(scheduler.slot_state(0), Some(SlotState::Submitted));
        assert_eq!(scheduler.outstanding(), 0, "nothing reached the queue");
        assert!(scheduler.has_failed());
        assert!(scheduler.draw_frame(&mut gpu).is_err());
    }

    #[test]
    fn test_present_failure_stops_scheduling() {
        let mut gpu = SimulatedGpu::new(2);
        gpu.fail_present = true;
        let mut scheduler = FrameScheduler::new(2, 2).unwrap();

        assert!(scheduler.draw_frame(&mut gpu).is_err());
        gpu.fail_present = false;
        gpu.calls.clear();
        assert!(scheduler.draw_frame(&mut gpu).is_err());
        assert!(gpu.calls.is_empty());
    }

    #[test]
    fn test_healthy_frames_do_not_fail() {
        let mut gpu = SimulatedGpu::new(3);
        let mut scheduler = FrameScheduler::new(2, 3).unwrap();
        for _ in 0..10 {
            scheduler.draw_frame(&mut gpu).unwrap();
        }
        assert!(!scheduler.has_failed());
        assert!(gpu.unsignaled.len() <= 2);
    }

    #[test]
    fn test_zero_frames_rejected() {
        assert!(FrameScheduler::new(0, 3).is_err());
    }
}
