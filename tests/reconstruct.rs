mod common;

use std::sync::Arc;

use glam::{Mat4, Vec3};

use avatar_engine::load::{
    ComponentLoadInfo, IkChainLoadInfo, MaterialLoadInfo, PrimitiveLoadInfo, SkinLoadInfo, TextureLoadInfo,
};
use avatar_engine::resource::{
    BufferSource, BufferUsage, Deferred, PrimitiveTopology, ResourceError, TextureFormat, TextureSampler,
    TextureSource,
};
use avatar_engine::scene::{Camera, CameraComponent, HumanoidTag};
use avatar_engine::transform::TransformId;
use avatar_engine::{AsyncResourceLoader, ComponentType, EngineError, ModelInstance, ModelSlots};

use common::{chain_info, id, init_logger, reconstruct, CountingBackend, MODEL};

fn buffer_source(key: &str) -> BufferSource {
    BufferSource { key: key.into(), label: None, usage: BufferUsage::VERTEX, data: Arc::from(vec![0u8; 64]) }
}

fn primitive(loader: &AsyncResourceLoader, key: &str) -> PrimitiveLoadInfo {
    PrimitiveLoadInfo {
        topology: PrimitiveTopology::Triangles,
        vertex_buffer: loader.load_buffer(&buffer_source(key)),
        vertex_count: 3,
        index_buffer: None,
        index_count: 0,
        material: MaterialLoadInfo::default(),
        morph_targets: None,
    }
}

fn mesh(primitive_index: usize) -> ComponentLoadInfo {
    ComponentLoadInfo::Primitive { primitive_index, skin_index: None, morphed_primitive_index: None }
}

#[test]
fn test_missing_ik_effector_drops_component() {
    init_logger();
    let mut info = chain_info();
    info.nodes[0].components.push(ComponentLoadInfo::IkTarget {
        ik_index: 0,
        effector: id(42),
        chain: vec![IkChainLoadInfo { node: id(1), limit: None }],
        limit_radian: 1.0,
        loop_count: 10,
        transform_id: TransformId::Ik,
    });

    let scene = reconstruct(info);
    assert!(scene.get().ik_target(0).is_none());
    assert!(!scene.get().nodes()[0].has_component(ComponentType::IkTarget));
    scene.decrease_reference_count();
}

#[test]
fn test_shared_buffer_is_destroyed_once() {
    init_logger();
    let backend = CountingBackend::new();
    let loader = AsyncResourceLoader::new(backend.clone());

    let mut info = chain_info();
    info.primitives = vec![primitive(&loader, "body"), primitive(&loader, "body")];
    info.nodes[1].components.push(mesh(0));
    info.nodes[2].components.push(mesh(1));

    let scene = reconstruct(info);
    assert_eq!(scene.get().primitives().len(), 2);
    assert!(scene.get().primitives()[0].vertex_buffer.ptr_eq(&scene.get().primitives()[1].vertex_buffer));
    assert_eq!(backend.created_buffers(), 1);
    assert_eq!(backend.destroyed_buffers(), 0);

    scene.decrease_reference_count();
    assert!(scene.is_closed());
    assert_eq!(backend.destroyed_buffers(), 1);
}

#[test]
fn test_failed_texture_falls_back_to_white() {
    init_logger();
    let backend = CountingBackend::new();
    let loader = AsyncResourceLoader::new(backend.clone());

    // 像素数据不足，上传失败
    let texture = loader.load_texture(&TextureSource {
        key: "skin.png".into(),
        label: None,
        width: 4,
        height: 4,
        format: TextureFormat::Rgba8Srgb,
        data: Arc::from(vec![0u8; 8]),
    });
    let mut body = primitive(&loader, "body");
    body.material.base_color_texture = Some(TextureLoadInfo { texture, sampler: TextureSampler::default() });

    let mut info = chain_info();
    info.primitives = vec![body];
    info.nodes[1].components.push(mesh(0));

    let scene = reconstruct(info);
    assert_eq!(scene.get().primitives().len(), 1);
    assert!(scene.get().primitives()[0].material.base_color_texture.is_white());
    assert!(scene.get().nodes()[1].has_component(ComponentType::Primitive));
    scene.decrease_reference_count();
    assert_eq!(backend.destroyed_buffers(), 1);
}

#[test]
fn test_failed_buffer_drops_primitive() {
    init_logger();
    let backend = CountingBackend::new();
    let loader = AsyncResourceLoader::new(backend.clone());

    let broken = PrimitiveLoadInfo {
        topology: PrimitiveTopology::Triangles,
        vertex_buffer: Deferred::ready(Err(ResourceError::Allocation("out of memory".into()))),
        vertex_count: 3,
        index_buffer: None,
        index_count: 0,
        material: MaterialLoadInfo::default(),
        morph_targets: None,
    };
    let mut info = chain_info();
    info.primitives = vec![broken, primitive(&loader, "body")];
    info.nodes[1].components.push(mesh(0));
    info.nodes[2].components.push(mesh(1));

    let scene = reconstruct(info);
    let render_scene = scene.get();
    assert_eq!(render_scene.primitives().len(), 1);
    assert!(!render_scene.nodes()[1].has_component(ComponentType::Primitive));
    assert!(render_scene.nodes()[2].has_component(ComponentType::Primitive));
    assert_eq!(render_scene.primitive_components().count(), 1);
    scene.decrease_reference_count();
    assert_eq!(backend.created_buffers(), 1);
    assert_eq!(backend.destroyed_buffers(), 1);
}

#[test]
fn test_skin_palette_is_world_times_inverse_bind() {
    init_logger();
    let mut info = chain_info();
    let bind = [Mat4::from_translation(Vec3::Y), Mat4::from_translation(Vec3::Y * 2.0)];
    info.skins.push(SkinLoadInfo {
        name: Some("body".into()),
        joints: vec![id(1), id(2)],
        inverse_bind_matrices: Some(bind.iter().map(Mat4::inverse).collect()),
    });

    let scene = reconstruct(info);
    assert!(scene.get().nodes()[1].has_component(ComponentType::Joint));
    assert!(scene.get().nodes()[2].has_component(ComponentType::Joint));

    let mut instance = ModelInstance::new(scene.clone());
    scene.decrease_reference_count();

    // 绑定姿态下调色板为单位矩阵
    instance.update_render_data();
    let palette = instance.skin_palette(0).unwrap().snapshot();
    assert_eq!(palette.len(), 2);
    for matrix in palette.iter() {
        assert!(matrix.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    // 移动关节 1 后，两个关节一起平移
    instance.update_decomposed(1, TransformId::RelativeAnimation, |d| d.set_translation(Vec3::X)).unwrap();
    instance.update_render_data();
    let palette = instance.skin_palette(0).unwrap().snapshot();
    let expected = Mat4::from_translation(Vec3::X);
    assert!(palette[0].abs_diff_eq(expected, 1e-5));
    assert!(palette[1].abs_diff_eq(expected, 1e-5));
}

#[test]
fn test_missing_skin_joint_fails_reconstruction() {
    init_logger();
    let backend = CountingBackend::new();
    let loader = AsyncResourceLoader::new(backend.clone());

    let mut info = chain_info();
    info.primitives = vec![primitive(&loader, "body")];
    info.nodes[1].components.push(mesh(0));
    info.skins.push(SkinLoadInfo { name: None, joints: vec![id(1), id(77)], inverse_bind_matrices: None });

    let result = pollster::block_on(avatar_engine::SceneReconstructor::reconstruct(info));
    assert!(matches!(result, Err(EngineError::InvalidHierarchy(_))));
    assert_eq!(backend.created_buffers(), 1);
    assert_eq!(backend.destroyed_buffers(), 1);
}

#[test]
fn test_superseded_load_is_cancelled() {
    init_logger();
    let slots: ModelSlots<&'static str> = ModelSlots::new();

    let stale = slots.begin_load("player");
    let fresh = slots.begin_load("player");

    let old_scene = reconstruct(chain_info());
    let result = slots.complete(stale, Ok(old_scene.clone()));
    assert!(matches!(result, Err(EngineError::LoadCancelled)));
    assert!(old_scene.is_closed());
    assert!(slots.get(&"player").is_none());

    let new_scene = reconstruct(chain_info());
    let installed = slots.complete(fresh, Ok(new_scene.clone())).unwrap();
    assert!(installed.ptr_eq(&new_scene));
    assert_eq!(installed.get().model_id(), MODEL);
    assert!(slots.get(&"player").is_some());

    slots.remove(&"player");
    assert!(new_scene.is_closed());
}

#[test]
fn test_render_task_release_restores_reference_count() {
    init_logger();
    let backend = CountingBackend::new();
    let loader = AsyncResourceLoader::new(backend.clone());

    let mut info = chain_info();
    info.primitives = vec![primitive(&loader, "body")];
    info.nodes[2].components.push(mesh(0));

    let scene = reconstruct(info);
    let instance = ModelInstance::new(scene.clone());
    scene.decrease_reference_count();
    assert_eq!(scene.reference_count(), 1);

    let task = instance.create_render_task(Mat4::IDENTITY, 0xF000F0, 0);
    assert_eq!(scene.reference_count(), 2);
    assert_eq!(task.draws.len(), 1);
    assert!(task.draws[0].model_matrix.abs_diff_eq(Mat4::from_translation(Vec3::Y * 2.0), 1e-5));

    task.release();
    assert_eq!(scene.reference_count(), 1);

    drop(instance);
    assert!(scene.is_closed());
    assert_eq!(backend.destroyed_buffers(), 1);
}

#[test]
fn test_cloned_deferred_is_released_once() {
    init_logger();
    let backend = CountingBackend::new();
    let loader = AsyncResourceLoader::new(backend.clone());

    // 同一次请求克隆到两个图元
    let body = primitive(&loader, "body");
    let outline = PrimitiveLoadInfo {
        topology: PrimitiveTopology::Lines,
        vertex_buffer: body.vertex_buffer.clone(),
        vertex_count: 3,
        index_buffer: None,
        index_count: 0,
        material: MaterialLoadInfo::default(),
        morph_targets: None,
    };
    let mut info = chain_info();
    info.primitives = vec![body, outline];
    info.nodes[1].components.push(mesh(0));
    info.nodes[2].components.push(mesh(1));

    let scene = reconstruct(info);
    assert_eq!(scene.get().primitives().len(), 2);
    assert_eq!(backend.created_buffers(), 1);
    assert_eq!(backend.destroyed_buffers(), 0);

    scene.decrease_reference_count();
    assert!(scene.is_closed());
    assert_eq!(backend.destroyed_buffers(), 1);
}

#[test]
fn test_joint_shared_by_two_skins() {
    init_logger();
    let mut info = chain_info();
    info.skins.push(SkinLoadInfo { name: Some("body".into()), joints: vec![id(1), id(2)], inverse_bind_matrices: None });
    info.skins.push(SkinLoadInfo {
        name: Some("hair".into()),
        joints: vec![id(1)],
        inverse_bind_matrices: Some(vec![Mat4::from_translation(-Vec3::Y)]),
    });

    let scene = reconstruct(info);
    assert_eq!(scene.get().skins().len(), 2);
    assert!(scene.get().nodes()[1].has_component(ComponentType::Joint));

    let mut instance = ModelInstance::new(scene.clone());
    scene.decrease_reference_count();

    instance.update_decomposed(1, TransformId::RelativeAnimation, |d| d.set_translation(Vec3::X)).unwrap();
    instance.update_render_data();
    let joint_world = Mat4::from_translation(Vec3::new(1.0, 1.0, 0.0));
    let body = instance.skin_palette(0).unwrap().snapshot();
    assert!(body[0].abs_diff_eq(joint_world, 1e-5));
    let hair = instance.skin_palette(1).unwrap().snapshot();
    assert_eq!(hair.len(), 1);
    assert!(hair[0].abs_diff_eq(Mat4::from_translation(Vec3::X), 1e-5));
}

#[test]
fn test_duplicate_camera_index_fails_reconstruction() {
    init_logger();
    let backend = CountingBackend::new();
    let loader = AsyncResourceLoader::new(backend.clone());

    let camera = CameraComponent {
        camera_index: 0,
        camera: Camera::Orthographic { xmag: 1.0, ymag: 1.0, znear: 0.1, zfar: 10.0 },
    };
    let mut info = chain_info();
    info.primitives = vec![primitive(&loader, "body")];
    info.nodes[0].components.push(mesh(0));
    info.nodes[1].components.push(ComponentLoadInfo::Camera(camera));
    info.nodes[2].components.push(ComponentLoadInfo::Camera(camera));

    let result = pollster::block_on(avatar_engine::SceneReconstructor::reconstruct(info));
    assert!(matches!(result, Err(EngineError::DuplicateIndex { kind: "camera", index: 0 })));
    assert_eq!(backend.destroyed_buffers(), 1);
}

#[test]
fn test_humanoid_tag_lookup() {
    init_logger();
    let mut info = chain_info();
    info.nodes[1].humanoid_tags = vec![HumanoidTag::Neck];
    info.nodes[2].humanoid_tags = vec![HumanoidTag::Head];

    let scene = reconstruct(info);
    assert_eq!(scene.get().node_by_humanoid_tag(HumanoidTag::Head), Some(2));
    assert_eq!(scene.get().node_by_humanoid_tag(HumanoidTag::Neck), Some(1));
    assert_eq!(scene.get().node_by_humanoid_tag(HumanoidTag::Hips), None);
    scene.decrease_reference_count();
}
