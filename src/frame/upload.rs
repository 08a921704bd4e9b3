// Upload/flush stage - one-shot transfer of vertex data to the GPU
//
// Runs once before the frame loop. Order on the device: host writes, flush,
// HOST_WRITE -> VERTEX_ATTRIBUTE_READ barrier, then the CPU blocks on a
// dedicated fence. Buffers stay mapped for the life of the process.

use super::gpu::{FenceWait, FrameGpu, UploadGpu};
use crate::error::{RenderError, RenderResult};
use std::time::Duration;

/// One vertex attribute stream, already laid out as bytes
#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute<'a> {
    pub label: &'a str,
    pub bytes: &'a [u8],
}

/// Allocate host-visible buffers sized exactly to each attribute
pub fn create_vertex_buffers<G: UploadGpu>(
    gpu: &G,
    attributes: &[VertexAttribute<'_>],
) -> RenderResult<Vec<G::Buffer>> {
    attributes
        .iter()
        .map(|attribute| {
            if attribute.bytes.is_empty() {
                return Err(RenderError::EmptyUpload {
                    label: attribute.label.to_string(),
                });
            }
            gpu.create_host_buffer(attribute.label, attribute.bytes.len() as u64)
        })
        .collect()
}

/// Write every attribute into its buffer and make it visible to vertex input.
///
/// Writes overwrite from offset 0, so running this twice with the same data
/// leaves the buffers exactly as one run would.
pub fn write_vertex_data<G: UploadGpu>(
    gpu: &G,
    buffers: &mut [G::Buffer],
    attributes: &[VertexAttribute<'_>],
    timeout: Option<Duration>,
) -> RenderResult<()> {
    debug_assert_eq!(buffers.len(), attributes.len());

    for (buffer, attribute) in buffers.iter_mut().zip(attributes) {
        gpu.write_mapped(buffer, attribute.bytes)?;
    }
    for buffer in buffers.iter() {
        gpu.flush_mapped(buffer)?;
    }

    let commands = gpu.record_host_write_barrier()?;
    let fence = gpu.create_fence(false)?;
    gpu.submit(&commands, None, &fence)?;

    // `commands` and `fence` are released on return, so any failure has to
    // drain the device first.
    match gpu.wait_for_fence(&fence, timeout) {
        Ok(FenceWait::Signaled) => {
            log::debug!("Vertex upload complete ({} buffers)", buffers.len());
            Ok(())
        }
        Ok(FenceWait::TimedOut) => {
            drain_after_failure(gpu);
            Err(RenderError::Hung {
                what: "vertex upload",
                timeout: timeout.unwrap_or(Duration::MAX),
            })
        }
        Err(e) => {
            drain_after_failure(gpu);
            Err(e)
        }
    }
}

fn drain_after_failure<G: FrameGpu>(gpu: &G) {
    if let Err(e) = gpu.wait_idle() {
        log::warn!("Device did not drain after failed vertex upload: {}", e);
    }
}

/// Create the vertex buffers and upload `attributes` into them
pub fn upload_vertex_attributes<G: UploadGpu>(
    gpu: &G,
    attributes: &[VertexAttribute<'_>],
    timeout: Option<Duration>,
) -> RenderResult<Vec<G::Buffer>> {
    let mut buffers = create_vertex_buffers(gpu, attributes)?;
    write_vertex_data(gpu, &mut buffers, attributes, timeout)?;
    Ok(buffers)
}
