//! In-memory transport that records every round trip

use std::ptr::{self, NonNull};

use spin::Mutex;
use virgl_protocol::drm::ClipRect;

use super::{CreatedResource, MappedRegion, ResourceCreateArgs, TransferArgs, Transport};
use crate::error::{Error, Result, Verb};

#[derive(Debug, Default)]
pub struct Recorded {
    pub created: Vec<ResourceCreateArgs>,
    pub maps: usize,
    pub mmaps: usize,
    pub munmaps: usize,
    pub puts: Vec<(u32, TransferArgs)>,
    pub gets: Vec<(u32, TransferArgs)>,
    pub waits: Vec<u32>,
    pub submissions: Vec<Vec<u32>>,
    pub closed: Vec<u32>,
    pub flinks: usize,
    pub dirty: Vec<(u32, Vec<ClipRect>)>,
}

#[derive(Default)]
struct State {
    next_handle: u32,
    recorded: Recorded,
    failing: Vec<Failure>,
}

struct Failure {
    verb: Verb,
    /// Calls still allowed through before the failure kicks in
    skip: usize,
    errno: nix::Error,
}

/// Test transport: hands out sequential handles, backs mappings with heap
/// memory and can be told to fail a given verb.
#[derive(Default)]
pub struct RecordingTransport {
    state: Mutex<State>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `verb` fail with `errno`
    pub fn fail(&self, verb: Verb, errno: nix::Error) {
        self.fail_after(verb, 0, errno);
    }

    /// Let `skip` calls of `verb` succeed, then fail every later one
    pub fn fail_after(&self, verb: Verb, skip: usize, errno: nix::Error) {
        self.state.lock().failing.push(Failure { verb, skip, errno });
    }

    pub fn heal(&self) {
        self.state.lock().failing.clear();
    }

    /// Run `f` against everything recorded so far
    pub fn with<R>(&self, f: impl FnOnce(&Recorded) -> R) -> R {
        f(&self.state.lock().recorded)
    }

    pub fn reset(&self) {
        self.state.lock().recorded = Recorded::default();
    }

    fn check(state: &mut State, verb: Verb) -> Result<()> {
        match state.failing.iter_mut().find(|f| f.verb == verb) {
            Some(f) if f.skip > 0 => {
                f.skip -= 1;
                Ok(())
            }
            Some(f) => Err(Error::transport(verb, f.errno)),
            None => Ok(()),
        }
    }
}

impl Transport for RecordingTransport {
    fn resource_create(&self, args: &ResourceCreateArgs) -> Result<CreatedResource> {
        let mut state = self.state.lock();
        Self::check(&mut state, Verb::ResourceCreate)?;
        state.next_handle += 1;
        let handle = state.next_handle;
        state.recorded.created.push(*args);
        Ok(CreatedResource {
            kernel_handle: handle,
            res_handle: handle + 100,
        })
    }

    fn map(&self, kernel_handle: u32) -> Result<u64> {
        let mut state = self.state.lock();
        Self::check(&mut state, Verb::Map)?;
        state.recorded.maps += 1;
        Ok(u64::from(kernel_handle) << 12)
    }

    fn mmap(&self, _offset: u64, len: usize) -> Result<MappedRegion> {
        let mut state = self.state.lock();
        Self::check(&mut state, Verb::Mmap)?;
        state.recorded.mmaps += 1;

        let memory = vec![0u8; len.max(1)].into_boxed_slice();
        let raw = Box::into_raw(memory).cast::<u8>();
        let ptr = NonNull::new(raw).ok_or_else(|| Error::transport(Verb::Mmap, nix::Error::ENOMEM))?;
        Ok(unsafe { MappedRegion::from_raw(ptr, len.max(1)) })
    }

    fn munmap(&self, region: MappedRegion) {
        self.state.lock().recorded.munmaps += 1;
        let slice = ptr::slice_from_raw_parts_mut(region.as_ptr().as_ptr(), region.len());
        drop(unsafe { Box::from_raw(slice) });
    }

    fn transfer_put(&self, kernel_handle: u32, args: &TransferArgs) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, Verb::TransferPut)?;
        state.recorded.puts.push((kernel_handle, *args));
        Ok(())
    }

    fn transfer_get(&self, kernel_handle: u32, args: &TransferArgs) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, Verb::TransferGet)?;
        state.recorded.gets.push((kernel_handle, *args));
        Ok(())
    }

    fn wait(&self, kernel_handle: u32) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, Verb::Wait)?;
        state.recorded.waits.push(kernel_handle);
        Ok(())
    }

    fn execbuffer(&self, words: &[u32]) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, Verb::Execbuffer)?;
        state.recorded.submissions.push(words.to_vec());
        Ok(())
    }

    fn gem_close(&self, kernel_handle: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.recorded.closed.push(kernel_handle);
        Self::check(&mut state, Verb::GemClose)
    }

    fn flink(&self, kernel_handle: u32) -> Result<u32> {
        let mut state = self.state.lock();
        Self::check(&mut state, Verb::Flink)?;
        state.recorded.flinks += 1;
        Ok(kernel_handle + 1000)
    }

    fn dirty_fb(&self, fb_id: u32, clips: &[ClipRect]) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, Verb::DirtyFb)?;
        state.recorded.dirty.push((fb_id, clips.to_vec()));
        Ok(())
    }
}
