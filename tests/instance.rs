mod common;

use std::f32::consts::FRAC_PI_3;
use std::sync::Arc;

use glam::{Mat4, Vec3};

use avatar_engine::animation::{
    Animation, AnimationChannel, AnimationItem, ChannelTarget, ChannelValues, ContextSnapshot, KeyframeValues,
};
use avatar_engine::load::{
    ComponentLoadInfo, IkChainLoadInfo, ModelLoadInfo, MorphTargetsLoadInfo, PrimitiveLoadInfo, SkinLoadInfo,
};
use avatar_engine::resource::{BufferSource, BufferUsage, MorphTargetGroup, PrimitiveTopology};
use avatar_engine::scene::{Camera, CameraComponent, Expression, MorphTargetBinding};
use avatar_engine::transform::TransformId;
use avatar_engine::{AsyncResourceLoader, Interpolation, ModelInstance};

use common::{chain_info, id, init_logger, node, reconstruct, CountingBackend, MODEL};

fn position(matrix: Mat4) -> Vec3 {
    matrix.col(3).truncate()
}

fn instance_of(info: ModelLoadInfo) -> ModelInstance {
    let scene = reconstruct(info);
    let instance = ModelInstance::new(scene.clone());
    scene.decrease_reference_count();
    instance
}

#[test]
fn test_ik_reaches_target_and_disabling_restores_pose() {
    init_logger();
    let mut info = chain_info();
    // 目标节点 3 挂在根下，距关节 1 恰为骨长
    info.nodes[0].children.push(3);
    let mut target = node(3, Vec3::new(1.0, 1.0, 0.0), vec![]);
    target.components.push(ComponentLoadInfo::IkTarget {
        ik_index: 0,
        effector: id(2),
        chain: vec![IkChainLoadInfo { node: id(1), limit: None }],
        limit_radian: 0.5,
        loop_count: 200,
        transform_id: TransformId::Ik,
    });
    info.nodes.push(target);

    let mut instance = instance_of(info);
    assert_eq!(instance.is_ik_enabled(0), Some(true));

    instance.update_render_data();
    let effector = position(instance.node_world_transform(2).unwrap());
    assert!((effector - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-2, "effector {:?}", effector);
    assert!(instance.transform_map(1).unwrap().get(TransformId::Ik).is_some());

    assert!(instance.set_ik_enabled(0, false));
    assert_eq!(instance.is_ik_enabled(0), Some(false));
    assert!(instance.transform_map(1).unwrap().get(TransformId::Ik).is_none());

    instance.update_render_data();
    let effector = position(instance.node_world_transform(2).unwrap());
    assert!(effector.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));

    assert!(!instance.set_ik_enabled(3, false));
}

#[test]
fn test_influence_applies_on_next_frame() {
    init_logger();
    // 根 → 1 (源, +X) / 2 (目标, +Z)
    let mut source = node(1, Vec3::X, vec![]);
    source.components.push(ComponentLoadInfo::InfluenceSource {
        target: id(2),
        influence_rotation: 1.0,
        influence_translation: 0.5,
        append_local: false,
    });
    let info = ModelLoadInfo {
        model_id: MODEL,
        root_node: 0,
        nodes: vec![node(0, Vec3::ZERO, vec![1, 2]), source, node(2, Vec3::Z, vec![])],
        ..Default::default()
    };

    let mut instance = instance_of(info);

    // 第一帧只写入目标的附加层
    instance.update_render_data();
    assert!(instance.transform_map(2).unwrap().get(TransformId::Influence).is_some());
    assert!(position(instance.node_world_transform(2).unwrap()).abs_diff_eq(Vec3::Z, 1e-5));

    // 第二帧传播
    instance.update_render_data();
    let expected = Vec3::Z + Vec3::X * 0.5;
    assert!(position(instance.node_world_transform(2).unwrap()).abs_diff_eq(expected, 1e-5));

    // 再来一帧不会累加
    instance.update_render_data();
    assert!(position(instance.node_world_transform(2).unwrap()).abs_diff_eq(expected, 1e-5));
}

#[test]
fn test_appended_influences_combine() {
    init_logger();
    // 根 → 1 (源, +X) / 2 (目标, +Z) / 3 (源, +Y)，两个源都追加到同一目标
    let source = |index, translation, weight| {
        let mut info = node(index, translation, vec![]);
        info.components.push(ComponentLoadInfo::InfluenceSource {
            target: id(2),
            influence_rotation: 1.0,
            influence_translation: weight,
            append_local: true,
        });
        info
    };
    let info = ModelLoadInfo {
        model_id: MODEL,
        root_node: 0,
        nodes: vec![
            node(0, Vec3::ZERO, vec![1, 2, 3]),
            source(1, Vec3::X, 1.0),
            node(2, Vec3::Z, vec![]),
            source(3, Vec3::Y, 0.5),
        ],
        ..Default::default()
    };

    let mut instance = instance_of(info);
    instance.update_render_data();
    let layer = instance.transform_map(2).unwrap().get(TransformId::Influence).unwrap().matrix();
    assert!(position(layer).abs_diff_eq(Vec3::new(1.0, 0.5, 0.0), 1e-5));

    // 每帧先清空再追加，不会跨帧累积
    for _ in 0..3 {
        instance.update_render_data();
    }
    let expected = Vec3::new(1.0, 0.5, 1.0);
    assert!(position(instance.node_world_transform(2).unwrap()).abs_diff_eq(expected, 1e-5));
}

#[test]
fn test_camera_transform_follows_node() {
    init_logger();
    let mut info = chain_info();
    info.nodes[2].components.push(ComponentLoadInfo::Camera(CameraComponent {
        camera_index: 0,
        camera: Camera::Perspective { aspect_ratio: None, yfov: FRAC_PI_3, znear: 0.05, zfar: Some(100.0) },
    }));

    let mut instance = instance_of(info);
    assert!(instance.camera_transform(0).is_none());

    instance.update_camera();
    let camera = instance.camera_transform(0).unwrap();
    assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));
    assert!((camera.view * camera.world).abs_diff_eq(Mat4::IDENTITY, 1e-5));
    assert!(camera.projection(16.0 / 9.0).is_finite());
    assert!(instance.camera_transform(1).is_none());
}

#[test]
fn test_debug_render_emits_joint_lines() {
    init_logger();
    let mut info = chain_info();
    info.skins.push(SkinLoadInfo {
        name: None,
        joints: vec![id(1), id(2)],
        inverse_bind_matrices: None,
    });

    let mut instance = instance_of(info);
    let lines = instance.debug_render().to_vec();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().any(|line| line.start == Vec3::Y && line.end == Vec3::new(0.0, 2.0, 0.0)));
}

#[test]
fn test_expression_weight_fans_out_to_groups() {
    init_logger();
    let backend = CountingBackend::new();
    let loader = AsyncResourceLoader::new(backend.clone());
    let source = |key: &str, usage| BufferSource { key: key.into(), label: None, usage, data: Arc::from(vec![0u8; 32]) };

    let mut info = chain_info();
    info.primitives.push(PrimitiveLoadInfo {
        topology: PrimitiveTopology::Triangles,
        vertex_buffer: loader.load_buffer(&source("face", BufferUsage::VERTEX)),
        vertex_count: 3,
        index_buffer: None,
        index_count: 0,
        material: Default::default(),
        morph_targets: Some(MorphTargetsLoadInfo {
            buffer: loader.load_buffer(&source("face.morph", BufferUsage::MORPH_TARGET)),
            position_targets: 2,
            color_targets: 0,
            tex_coord_targets: 0,
            groups: vec![
                MorphTargetGroup { position: Some(0), ..Default::default() },
                MorphTargetGroup { position: Some(1), ..Default::default() },
            ],
        }),
    });
    info.nodes[1].components.push(ComponentLoadInfo::Primitive {
        primitive_index: 0,
        skin_index: None,
        morphed_primitive_index: Some(3),
    });
    info.expressions.push(Expression {
        name: Some("smile".into()),
        tag: None,
        is_binary: false,
        bindings: vec![
            MorphTargetBinding { morphed_primitive_index: 3, target_group_index: 1, weight: 0.5 },
            // 不存在的变形图元被丢弃
            MorphTargetBinding { morphed_primitive_index: 9, target_group_index: 0, weight: 1.0 },
        ],
    });

    let mut instance = instance_of(info);
    assert_eq!(instance.scene().morphed_primitive_count(), 1);
    assert_eq!(instance.scene().expressions()[0].bindings.len(), 1);
    assert_eq!(instance.group_weight(0, 1), Some(0.0));

    assert!(instance.set_expression_weight(0, 1.0));
    assert_eq!(instance.group_weight(0, 1), Some(0.5));
    assert_eq!(instance.group_weight(0, 0), Some(0.0));
    assert!(!instance.set_expression_weight(1, 1.0));

    // 表情通道驱动
    let channel = AnimationChannel::new(
        ChannelTarget::Expression { index: 0 },
        Interpolation::Linear,
        vec![0.0, 1.0],
        ChannelValues::Float(KeyframeValues::new(vec![0.0, 1.0], 1).unwrap()),
        None,
    )
    .unwrap();
    let animation = Arc::new(Animation::new(Some("blink".into()), None, vec![channel]));
    let mut context = ContextSnapshot::new(0, 0.0);
    let mut items = vec![AnimationItem::new(animation, instance.scene(), &context, false)];
    context.advance_seconds(0.5);
    instance.update(&context, &mut items);
    assert!((instance.group_weight(0, 1).unwrap() - 0.25).abs() < 1e-4);

    let task = instance.create_render_task(Mat4::IDENTITY, 0, 0);
    assert_eq!(task.morph_weights.len(), 1);
    assert!((task.morph_weights[0][1] - 0.25).abs() < 1e-4);
    task.release();

    drop(instance);
    assert_eq!(backend.created_buffers(), 2);
    assert_eq!(backend.destroyed_buffers(), 2);
}
