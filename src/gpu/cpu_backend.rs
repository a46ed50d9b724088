//! CPU reference backend
//!
//! Executes the sort kernels with the Rust reference implementations in
//! [`crate::sort`]. Dispatches are recorded into a [`CpuEncoder`] and run in
//! order at [`flush`](ComputeBackend::flush); the workgroups of a dispatch
//! run in parallel on the rayon pool.

use std::sync::Arc;

use parking_lot::RwLock;

use super::backend::{ComputeBackend, GenKeysUniforms, KernelBindings, SortKernel, SweepUniforms};
use crate::config::SorterConfig;
use crate::error::{contract_violation, device_error, SortResult};
use crate::sort::{down_sweep, group_scan, keygen, up_sweep};

/// Word buffer shared between the backend and recorded dispatches
#[derive(Debug, Clone)]
pub struct CpuBuffer {
    label: String,
    words: Arc<RwLock<Vec<u32>>>,
}

impl CpuBuffer {
    pub fn label(&self) -> &str {
        &self.label
    }

    fn same(&self, other: &CpuBuffer) -> bool {
        Arc::ptr_eq(&self.words, &other.words)
    }
}

struct CpuDispatch {
    kernel: SortKernel,
    uniforms: Vec<u8>,
    buffers: Vec<CpuBuffer>,
    workgroups: u32,
}

/// Recorded dispatches, executed in order at flush
pub struct CpuEncoder {
    label: String,
    dispatches: Vec<CpuDispatch>,
}

impl CpuEncoder {
    pub fn dispatch_count(&self) -> usize {
        self.dispatches.len()
    }
}

pub struct CpuBackend {
    config: SorterConfig,
}

impl CpuBackend {
    pub fn new(config: SorterConfig) -> SortResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    fn execute(&self, dispatch: &CpuDispatch) {
        let group_size = self.config.group_size;
        let buffers = &dispatch.buffers;
        match dispatch.kernel {
            SortKernel::GenKeys => {
                let uniforms: GenKeysUniforms = bytemuck::pod_read_unaligned(&dispatch.uniforms);
                let positions = buffers[0].words.read();
                let mut keys = buffers[1].words.write();
                let mut values = buffers[2].words.write();
                keygen::run(
                    &self.config,
                    &uniforms,
                    dispatch.workgroups,
                    &positions,
                    &mut keys,
                    &mut values,
                );
            }
            SortKernel::UpSweep => {
                let uniforms = self.sweep_uniforms(dispatch);
                let keys = buffers[0].words.read();
                let mut cache = buffers[1].words.write();
                up_sweep::run(group_size, &uniforms, &keys, &mut cache);
            }
            SortKernel::GroupScan => {
                let uniforms = self.sweep_uniforms(dispatch);
                let mut cache = buffers[0].words.write();
                group_scan::run(group_size, &uniforms, &mut cache);
            }
            SortKernel::DownSweep => {
                let uniforms = self.sweep_uniforms(dispatch);
                let cache = buffers[0].words.read();
                let keys_in = buffers[1].words.read();
                let values_in = buffers[2].words.read();
                let mut keys_out = buffers[3].words.write();
                let mut values_out = buffers[4].words.write();
                down_sweep::run(
                    group_size,
                    &uniforms,
                    &cache,
                    &keys_in,
                    &values_in,
                    &mut keys_out,
                    &mut values_out,
                );
            }
        }
    }

    /// Sweep kernels process `workgroups` groups, at most `group_count`
    fn sweep_uniforms(&self, dispatch: &CpuDispatch) -> SweepUniforms {
        let mut uniforms: SweepUniforms = bytemuck::pod_read_unaligned(&dispatch.uniforms);
        if dispatch.kernel != SortKernel::GroupScan {
            uniforms.group_count = uniforms.group_count.min(dispatch.workgroups);
        }
        uniforms
    }
}

impl ComputeBackend for CpuBackend {
    type Buffer = CpuBuffer;
    type Encoder = CpuEncoder;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn config(&self) -> &SorterConfig {
        &self.config
    }

    fn create_buffer(&self, label: &str, len: u32) -> SortResult<CpuBuffer> {
        Ok(CpuBuffer {
            label: label.to_string(),
            words: Arc::new(RwLock::new(vec![0; len as usize])),
        })
    }

    fn buffer_len(&self, buffer: &CpuBuffer) -> u32 {
        buffer.words.read().len() as u32
    }

    fn write_buffer(&self, buffer: &CpuBuffer, offset: u32, data: &[u32]) -> SortResult<()> {
        let mut words = buffer.words.write();
        let start = offset as usize;
        let end = start + data.len();
        if end > words.len() {
            return Err(device_error(
                "write_buffer",
                format!("'{}' holds {} words, write ends at {}", buffer.label, words.len(), end),
            ));
        }
        words[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: &CpuBuffer, offset: u32, len: u32) -> SortResult<Vec<u32>> {
        let words = buffer.words.read();
        let start = offset as usize;
        let end = start + len as usize;
        words.get(start..end).map(<[u32]>::to_vec).ok_or_else(|| {
            device_error(
                "read_buffer",
                format!("'{}' holds {} words, read ends at {}", buffer.label, words.len(), end),
            )
        })
    }

    fn create_encoder(&self, label: &str) -> CpuEncoder {
        CpuEncoder {
            label: label.to_string(),
            dispatches: Vec::new(),
        }
    }

    fn submit(
        &self,
        encoder: &mut CpuEncoder,
        bindings: KernelBindings<'_, CpuBuffer>,
        workgroups: u32,
    ) -> SortResult<()> {
        let kernel = bindings.kernel();
        let storage = bindings.storage_buffers();
        for (i, a) in storage.iter().enumerate() {
            if storage[i + 1..].iter().any(|b| a.same(b)) {
                return Err(contract_violation(format!(
                    "{} binds '{}' twice",
                    kernel.label(),
                    a.label
                )));
            }
        }
        if workgroups == 0 {
            return Ok(());
        }

        encoder.dispatches.push(CpuDispatch {
            kernel,
            uniforms: bindings.uniform_bytes().to_vec(),
            buffers: storage.into_iter().cloned().collect(),
            workgroups,
        });
        Ok(())
    }

    fn flush(&self, encoder: CpuEncoder) -> SortResult<()> {
        log::trace!(
            "[CpuBackend] Flushing '{}' ({} dispatches)",
            encoder.label,
            encoder.dispatches.len()
        );
        for dispatch in &encoder.dispatches {
            self.execute(dispatch);
        }
        Ok(())
    }
}
