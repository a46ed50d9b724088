//! wgpu backend
//!
//! Compiles the four sort kernels once per [`SorterConfig`] and records each
//! dispatch into its own compute pass. Pass boundaries are where wgpu makes
//! storage writes of one dispatch visible to the next.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::backend::{ComputeBackend, KernelBindings, SortKernel};
use super::preprocessor::build_kernel_source;
use crate::config::SorterConfig;
use crate::error::{allocation_error, device_error, DeviceErrorContext, SortError, SortResult};

/// Device buffer of 32-bit words
#[derive(Debug)]
pub struct GpuBuffer {
    buffer: wgpu::Buffer,
    len: u32,
}

impl GpuBuffer {
    /// Underlying wgpu buffer, e.g. to bind sorted values in a render pass
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Command encoder plus the per-dispatch resources it references
pub struct WgpuEncoder {
    encoder: wgpu::CommandEncoder,
    uniforms: Vec<wgpu::Buffer>,
    bind_groups: Vec<wgpu::BindGroup>,
}

struct KernelPipeline {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

/// Read-only flags of the storage slots of each kernel, from slot 1 on
fn storage_read_only(kernel: SortKernel) -> &'static [bool] {
    match kernel {
        SortKernel::GenKeys => &[true, false, false],
        SortKernel::UpSweep => &[true, false],
        SortKernel::GroupScan => &[false],
        SortKernel::DownSweep => &[true, true, true, false, false],
    }
}

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: SorterConfig,
    pipelines: Vec<KernelPipeline>,
}

impl WgpuBackend {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        config: SorterConfig,
    ) -> SortResult<Self> {
        config.validate()?;
        let limits = device.limits();
        if config.group_size > limits.max_compute_invocations_per_workgroup
            || config.group_size > limits.max_compute_workgroup_size_x
        {
            return Err(SortError::Config(format!(
                "group_size {} exceeds the device limit of {} invocations",
                config.group_size,
                limits
                    .max_compute_invocations_per_workgroup
                    .min(limits.max_compute_workgroup_size_x)
            )));
        }

        let pipelines = SortKernel::ALL
            .iter()
            .map(|&kernel| Self::create_pipeline(&device, &config, kernel))
            .collect::<SortResult<Vec<_>>>()?;

        log::info!(
            "[WgpuBackend] Compiled sort kernels: group size {}, {} key bits, {:?}",
            config.group_size,
            config.key_bits,
            config.quantization
        );

        Ok(Self {
            device,
            queue,
            config,
            pipelines,
        })
    }

    /// Headless device on the best available adapter; `Ok(None)` when there
    /// is no adapter at all
    pub fn request(config: SorterConfig) -> SortResult<Option<Self>> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let Some(adapter) = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })) else {
            log::warn!("[WgpuBackend] No adapter available");
            return Ok(None);
        };
        log::info!("[WgpuBackend] Using adapter {}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Sort Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .device_context("request_device")?;

        Self::new(Arc::new(device), Arc::new(queue), config).map(Some)
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    fn create_pipeline(
        device: &wgpu::Device,
        config: &SorterConfig,
        kernel: SortKernel,
    ) -> SortResult<KernelPipeline> {
        let source = build_kernel_source(kernel, config)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kernel.label()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for (slot, &read_only) in storage_read_only(kernel).iter().enumerate() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot as u32 + 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(kernel.label()),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(kernel.label()),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(kernel.label()),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: kernel.entry_point(),
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(device_error(&format!("compile {}", kernel.label()), error));
        }

        Ok(KernelPipeline { pipeline, layout })
    }
}

impl ComputeBackend for WgpuBackend {
    type Buffer = GpuBuffer;
    type Encoder = WgpuEncoder;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn config(&self) -> &SorterConfig {
        &self.config
    }

    fn create_buffer(&self, label: &str, len: u32) -> SortResult<GpuBuffer> {
        let bytes = len as u64 * 4;
        let limits = self.device.limits();
        let max_bytes = limits
            .max_buffer_size
            .min(limits.max_storage_buffer_binding_size as u64);
        if bytes > max_bytes {
            return Err(allocation_error(
                label,
                bytes,
                format!("device limit is {} bytes", max_bytes),
            ));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            // Zero-sized bindings are invalid
            size: bytes.max(4),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(allocation_error(label, bytes, error));
        }

        Ok(GpuBuffer { buffer, len })
    }

    fn buffer_len(&self, buffer: &GpuBuffer) -> u32 {
        buffer.len
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u32, data: &[u32]) -> SortResult<()> {
        let end = offset as u64 + data.len() as u64;
        if end > buffer.len as u64 {
            return Err(device_error(
                "write_buffer",
                format!("buffer holds {} words, write ends at {}", buffer.len, end),
            ));
        }
        if !data.is_empty() {
            self.queue
                .write_buffer(&buffer.buffer, offset as u64 * 4, bytemuck::cast_slice(data));
        }
        Ok(())
    }

    fn read_buffer(&self, buffer: &GpuBuffer, offset: u32, len: u32) -> SortResult<Vec<u32>> {
        let end = offset as u64 + len as u64;
        if end > buffer.len as u64 {
            return Err(device_error(
                "read_buffer",
                format!("buffer holds {} words, read ends at {}", buffer.len, end),
            ));
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let bytes = len as u64 * 4;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sort Readback Staging"),
            size: bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Sort Readback"),
        });
        encoder.copy_buffer_to_buffer(&buffer.buffer, offset as u64 * 4, &staging, 0, bytes);
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            // Receiver only goes away if the readback was abandoned
            let _ = tx.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);

        pollster::block_on(rx)
            .map_err(|_| SortError::BufferMapping("mapping callback was dropped".into()))?
            .map_err(|e| SortError::BufferMapping(e.to_string()))?;

        let words = {
            let data = buffer_slice.get_mapped_range();
            bytemuck::cast_slice::<u8, u32>(&data).to_vec()
        };
        staging.unmap();
        Ok(words)
    }

    fn create_encoder(&self, label: &str) -> WgpuEncoder {
        WgpuEncoder {
            encoder: self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) }),
            uniforms: Vec::new(),
            bind_groups: Vec::new(),
        }
    }

    fn submit(
        &self,
        encoder: &mut WgpuEncoder,
        bindings: KernelBindings<'_, GpuBuffer>,
        workgroups: u32,
    ) -> SortResult<()> {
        if workgroups == 0 {
            return Ok(());
        }
        let kernel = bindings.kernel();
        let max_workgroups = self.device.limits().max_compute_workgroups_per_dimension;
        if workgroups > max_workgroups {
            return Err(device_error(
                kernel.label(),
                format!("{} workgroups exceed the limit of {}", workgroups, max_workgroups),
            ));
        }

        let pipeline = &self.pipelines[kernel.index()];

        // Own uniform buffer per dispatch; queue writes would all land before
        // the first pass runs
        let uniforms = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(kernel.label()),
            contents: bindings.uniform_bytes(),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniforms.as_entire_binding(),
        }];
        for (slot, buffer) in bindings.storage_buffers().into_iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32 + 1,
                resource: buffer.buffer.as_entire_binding(),
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.label()),
            layout: &pipeline.layout,
            entries: &entries,
        });

        {
            let mut pass = encoder.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.label()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }

        encoder.uniforms.push(uniforms);
        encoder.bind_groups.push(bind_group);
        Ok(())
    }

    fn flush(&self, encoder: WgpuEncoder) -> SortResult<()> {
        let WgpuEncoder {
            encoder,
            uniforms,
            bind_groups,
        } = encoder;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.queue.submit(Some(encoder.finish()));
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(device_error("flush", error));
        }

        log::trace!("[WgpuBackend] Submitted {} dispatches", bind_groups.len());
        drop(bind_groups);
        drop(uniforms);
        Ok(())
    }
}
