// src/vk.rs
use anyhow::{Context, Result as AnyResult};
use ash::{vk, Entry};
use bytemuck::{Pod, Zeroable};
use std::{
    ffi::{CStr, CString},
    mem::size_of,
};
use tracing::{debug, info};

use crate::backend::SoftmaxForward;
use crate::error::{KernelError, Result};
use crate::layout::AxisLayout;
use crate::shaders::{compile_spirv, SOFTMAX_ENTRY_POINT, SOFTMAX_WGSL, SOFTMAX_WORKGROUP_SIZE};
use crate::softmax::check_len;

/// Workgroup count every implementation supports per dispatch dimension.
const MAX_GROUPS_X: u32 = 65_535;

#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
struct PushConsts {
    nthreads: u32,
    num_classes: u32,
    inner_size: u32,
    grid_width: u32,
}

/// Workgroups along x and y covering `nthreads` invocations.
fn grid_dims(nthreads: u32) -> (u32, u32) {
    let groups = nthreads.div_ceil(SOFTMAX_WORKGROUP_SIZE).max(1);
    let gx = groups.min(MAX_GROUPS_X);
    (gx, groups.div_ceil(gx))
}

/// Objects made so far while building a [`VkBackend`]. Dropping it while
/// armed destroys them in reverse creation order; null handles are skipped
/// by the driver.
struct PartialInit {
    instance: ash::Instance,
    device: Option<ash::Device>,
    desc_set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    shader_module: vk::ShaderModule,
    pipeline: vk::Pipeline,
    cmd_pool: vk::CommandPool,
    armed: bool,
}

impl PartialInit {
    fn new(instance: ash::Instance) -> Self {
        Self {
            instance,
            device: None,
            desc_set_layout: vk::DescriptorSetLayout::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            shader_module: vk::ShaderModule::null(),
            pipeline: vk::Pipeline::null(),
            cmd_pool: vk::CommandPool::null(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialInit {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        unsafe {
            if let Some(device) = &self.device {
                device.destroy_command_pool(self.cmd_pool, None);
                device.destroy_pipeline(self.pipeline, None);
                device.destroy_shader_module(self.shader_module, None);
                device.destroy_pipeline_layout(self.pipeline_layout, None);
                device.destroy_descriptor_set_layout(self.desc_set_layout, None);
                device.destroy_device(None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Vulkan compute backend running the softmax shader, one invocation per
/// work unit. Only `f32` is supported.
pub struct VkBackend {
    _entry: Entry,
    instance: ash::Instance,
    phys: vk::PhysicalDevice,
    device: ash::Device,
    device_name: String,
    queue: vk::Queue,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    cmd_pool: vk::CommandPool,
    desc_set_layout: vk::DescriptorSetLayout,
    desc_pool: vk::DescriptorPool,
}

impl VkBackend {
    pub fn new() -> Result<Self> {
        Ok(Self::create()?)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn create() -> AnyResult<Self> {
        let entry = unsafe { Entry::load().context("load Vulkan entry")? };
        let app_name = CString::new("mobula-op")?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .api_version(vk::API_VERSION_1_1);

        let inst_info = vk::InstanceCreateInfo::builder().application_info(&app_info);
        let instance = unsafe { entry.create_instance(&inst_info, None)? };
        let mut partial = PartialInit::new(instance.clone());

        // First device exposing a compute queue
        let (phys, qf_index) = unsafe { instance.enumerate_physical_devices()? }
            .into_iter()
            .find_map(|pd| {
                unsafe { instance.get_physical_device_queue_family_properties(pd) }
                    .iter()
                    .position(|q| q.queue_flags.contains(vk::QueueFlags::COMPUTE))
                    .map(|i| (pd, i as u32))
            })
            .context("no physical device with a compute queue")?;
        let props = unsafe { instance.get_physical_device_properties(phys) };
        let device_name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        info!(device = %device_name, queue_family = qf_index, "using vulkan backend");

        let priorities = [1.0f32];
        let qinfo = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(qf_index)
            .queue_priorities(&priorities)
            .build()];
        let dinfo = vk::DeviceCreateInfo::builder().queue_create_infos(&qinfo);
        let device = unsafe { instance.create_device(phys, &dinfo, None)? };
        partial.device = Some(device.clone());
        let queue = unsafe { device.get_device_queue(qf_index, 0) };

        // data (read) and probs (read_write) as STORAGE_BUFFER
        let mk_binding = |binding: u32| vk::DescriptorSetLayoutBinding {
            binding,
            descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::COMPUTE,
            p_immutable_samplers: std::ptr::null(),
        };
        let bindings = [mk_binding(0), mk_binding(1)];
        let desc_set_layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let desc_set_layout =
            unsafe { device.create_descriptor_set_layout(&desc_set_layout_info, None)? };
        partial.desc_set_layout = desc_set_layout;

        let pc_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::COMPUTE,
            offset: 0,
            size: size_of::<PushConsts>() as u32,
        }];
        let set_layouts = [desc_set_layout];
        let pl_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&pc_ranges);
        let pipeline_layout = unsafe { device.create_pipeline_layout(&pl_info, None)? };
        partial.pipeline_layout = pipeline_layout;

        let words = compile_spirv(SOFTMAX_WGSL)?;
        let sm_info = vk::ShaderModuleCreateInfo::builder().code(&words);
        let shader_module = unsafe { device.create_shader_module(&sm_info, None)? };
        partial.shader_module = shader_module;

        let entry_point = CString::new(SOFTMAX_ENTRY_POINT)?;
        let stage_info = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader_module)
            .name(&entry_point);

        let cp_info = vk::ComputePipelineCreateInfo::builder()
            .stage(*stage_info)
            .layout(pipeline_layout);
        let pipeline = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), &[*cp_info], None)
        }
        .map_err(|(_, e)| anyhow::anyhow!("pipeline create failed: {:?}", e))?[0];
        partial.pipeline = pipeline;

        unsafe { device.destroy_shader_module(shader_module, None) };
        partial.shader_module = vk::ShaderModule::null();

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(qf_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let cmd_pool = unsafe { device.create_command_pool(&pool_info, None)? };
        partial.cmd_pool = cmd_pool;

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: 2,
        }];
        let dp_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .pool_sizes(&pool_sizes)
            .max_sets(1);
        let desc_pool = unsafe { device.create_descriptor_pool(&dp_info, None)? };
        partial.disarm();

        Ok(Self {
            _entry: entry,
            instance,
            phys,
            device,
            device_name,
            queue,
            pipeline_layout,
            pipeline,
            cmd_pool,
            desc_set_layout,
            desc_pool,
        })
    }

    fn alloc_host_buffer(&self, size: vk::DeviceSize) -> AnyResult<(vk::Buffer, vk::DeviceMemory)> {
        let buf_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(vk::BufferUsageFlags::STORAGE_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buf_info, None)? };
        let mem_req = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let mem_props = unsafe { self.instance.get_physical_device_memory_properties(self.phys) };
        let mem_type = (0..mem_props.memory_type_count)
            .find(|&i| {
                let mt = mem_props.memory_types[i as usize];
                (mem_req.memory_type_bits & (1 << i)) != 0
                    && mt.property_flags.contains(
                        vk::MemoryPropertyFlags::HOST_VISIBLE
                            | vk::MemoryPropertyFlags::HOST_COHERENT,
                    )
            })
            .context("no HOST_VISIBLE|HOST_COHERENT memory type")?;

        let alloc = vk::MemoryAllocateInfo {
            allocation_size: mem_req.size,
            memory_type_index: mem_type,
            ..Default::default()
        };
        let memory = unsafe { self.device.allocate_memory(&alloc, None)? };
        unsafe { self.device.bind_buffer_memory(buffer, memory, 0)? };
        Ok((buffer, memory))
    }

    fn write_buffer_pod<T: Pod>(&self, mem: vk::DeviceMemory, data: &[T]) -> AnyResult<()> {
        let src: &[u8] = bytemuck::cast_slice(data);
        unsafe {
            let ptr =
                self.device.map_memory(mem, 0, src.len() as u64, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(src.as_ptr(), ptr as *mut u8, src.len());
            self.device.unmap_memory(mem);
        }
        Ok(())
    }

    fn read_buffer_pod<T: Pod>(&self, mem: vk::DeviceMemory, out: &mut [T]) -> AnyResult<()> {
        let dst: &mut [u8] = bytemuck::cast_slice_mut(out);
        unsafe {
            let ptr =
                self.device.map_memory(mem, 0, dst.len() as u64, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(ptr as *const u8, dst.as_mut_ptr(), dst.len());
            self.device.unmap_memory(mem);
        }
        Ok(())
    }

    /// Uploads `data`, runs one dispatch over every work unit, waits, and
    /// reads the result back into `probs`.
    fn run(&self, data: &[f32], pc: PushConsts, groups: (u32, u32), probs: &mut [f32]) -> AnyResult<()> {
        let bytes = (data.len() * size_of::<f32>()) as u64;
        let (buf_in, mem_in) = self.alloc_host_buffer(bytes)?;
        let out = self.alloc_host_buffer(bytes);
        let result = match out {
            Ok((buf_out, mem_out)) => {
                let r = self.dispatch(data, pc, groups, (buf_in, mem_in), (buf_out, mem_out), probs);
                unsafe {
                    self.device.destroy_buffer(buf_out, None);
                    self.device.free_memory(mem_out, None);
                }
                r
            }
            Err(e) => Err(e),
        };
        unsafe {
            self.device.destroy_buffer(buf_in, None);
            self.device.free_memory(mem_in, None);
        }
        result
    }

    fn dispatch(
        &self,
        data: &[f32],
        pc: PushConsts,
        (gx, gy): (u32, u32),
        (buf_in, mem_in): (vk::Buffer, vk::DeviceMemory),
        (buf_out, mem_out): (vk::Buffer, vk::DeviceMemory),
        probs: &mut [f32],
    ) -> AnyResult<()> {
        let bytes = (data.len() * size_of::<f32>()) as u64;
        self.write_buffer_pod(mem_in, data)?;

        let set_layouts = [self.desc_set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.desc_pool)
            .set_layouts(&set_layouts);
        let desc_set = unsafe { self.device.allocate_descriptor_sets(&alloc_info)? }[0];

        let descs = [
            vk::DescriptorBufferInfo { buffer: buf_in, offset: 0, range: bytes },
            vk::DescriptorBufferInfo { buffer: buf_out, offset: 0, range: bytes },
        ];
        let writes = [
            vk::WriteDescriptorSet {
                dst_set: desc_set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
                p_buffer_info: &descs[0],
                ..Default::default()
            },
            vk::WriteDescriptorSet {
                dst_set: desc_set,
                dst_binding: 1,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
                p_buffer_info: &descs[1],
                ..Default::default()
            },
        ];
        unsafe { self.device.update_descriptor_sets(&writes, &[]) };

        let alloc = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.cmd_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = unsafe { self.device.allocate_command_buffers(&alloc)? }[0];

        let begin = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        let recorded = unsafe {
            self.device.begin_command_buffer(cmd, &begin).and_then(|_| {
                self.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline);
                self.device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::COMPUTE,
                    self.pipeline_layout,
                    0,
                    &[desc_set],
                    &[],
                );
                self.device.cmd_push_constants(
                    cmd,
                    self.pipeline_layout,
                    vk::ShaderStageFlags::COMPUTE,
                    0,
                    bytemuck::bytes_of(&pc),
                );
                self.device.cmd_dispatch(cmd, gx, gy, 1);
                self.device.end_command_buffer(cmd)
            })
        };

        // Submit + wait
        let submitted = recorded.and_then(|_| {
            let cmds = [cmd];
            let submit = vk::SubmitInfo::builder().command_buffers(&cmds);
            unsafe {
                self.device.queue_submit(self.queue, &[*submit], vk::Fence::null())?;
                self.device.queue_wait_idle(self.queue)
            }
        });

        unsafe {
            self.device.free_command_buffers(self.cmd_pool, &[cmd]);
            self.device.free_descriptor_sets(self.desc_pool, &[desc_set]).ok();
        }
        submitted.context("softmax dispatch failed")?;

        self.read_buffer_pod(mem_out, probs)
    }
}

impl SoftmaxForward<f32> for VkBackend {
    fn softmax_forward(&mut self, data: &[f32], layout: AxisLayout, probs: &mut [f32]) -> Result<()> {
        check_len("data", data.len(), layout)?;
        check_len("probs", probs.len(), layout)?;
        let nthreads = layout.num_work_units();
        if nthreads == 0 {
            return Ok(());
        }
        let len = layout.len();
        let to_u32 = |n: usize| {
            u32::try_from(n).map_err(|_| KernelError::Unsupported {
                backend: "vulkan",
                what: format!("tensors of {len} elements (limit {})", u32::MAX),
            })
        };
        to_u32(len)?;
        let nthreads = to_u32(nthreads)?;
        let (gx, gy) = grid_dims(nthreads);
        // global index must not wrap past u32 on the last grid row
        if u64::from(gx) * u64::from(gy) * u64::from(SOFTMAX_WORKGROUP_SIZE) > u64::from(u32::MAX) {
            return Err(KernelError::Unsupported {
                backend: "vulkan",
                what: format!("{nthreads} work units in one dispatch"),
            });
        }
        let pc = PushConsts {
            nthreads,
            num_classes: to_u32(layout.num_classes())?,
            inner_size: to_u32(layout.inner_size())?,
            grid_width: gx * SOFTMAX_WORKGROUP_SIZE,
        };
        debug!(
            outer = layout.outer_size(),
            classes = layout.num_classes(),
            inner = layout.inner_size(),
            nthreads,
            groups_x = gx,
            groups_y = gy,
            "softmax forward on vulkan"
        );
        self.run(&data[..len], pc, (gx, gy), &mut probs[..len])?;
        Ok(())
    }

    fn softmax_forward_inplace(&mut self, x: &mut [f32], layout: AxisLayout) -> Result<()> {
        check_len("buf", x.len(), layout)?;
        let input = x[..layout.len()].to_vec();
        self.softmax_forward(&input, layout, x)
    }
}

impl Drop for VkBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_descriptor_pool(self.desc_pool, None);
            self.device.destroy_command_pool(self.cmd_pool, None);
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.destroy_descriptor_set_layout(self.desc_set_layout, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
