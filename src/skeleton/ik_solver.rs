//! IK 求解器 - CCD 迭代
//!
//! 约定：节点本地矩阵 = 动画层 * IK 层，IK 层只含旋转。
//! 每次迭代对链上每个关节：
//! - 在关节局部空间中把末端方向转向目标方向
//! - 旋转角不超过 `limit_radian`
//! - 有欧拉角限制时夹到 [min, max]，只有单轴可动时走单轴模式
//! 距离不再下降时回退到最佳结果并结束。

use glam::{EulerRot, Mat3, Quat, Vec3};
use std::f32::consts::PI;

use super::{IkChainLink, IkLimit, IkPose, IkTargetComponent};
use crate::config::get_config;

// ============================================================================
// IK 链状态
// ============================================================================

/// IK 链节点状态
#[derive(Clone, Debug)]
struct IkChainState {
    /// 动画层给出的本地旋转
    base_rotation: Quat,
    /// 当前 IK 旋转
    ik_rotation: Quat,
    /// 上一次迭代的欧拉角（用于连续性）
    prev_angle: Vec3,
    /// 单轴模式下的累积角度
    plane_mode_angle: f32,
    /// 最佳 IK 旋转（用于回退）
    best_ik_rotation: Quat,
}

/// 求解轴类型
#[derive(Clone, Copy, Debug, PartialEq)]
enum SolveAxis {
    X,
    Y,
    Z,
}

impl SolveAxis {
    fn vector(self) -> Vec3 {
        match self {
            SolveAxis::X => Vec3::X,
            SolveAxis::Y => Vec3::Y,
            SolveAxis::Z => Vec3::Z,
        }
    }

    fn component(self, v: Vec3) -> f32 {
        match self {
            SolveAxis::X => v.x,
            SolveAxis::Y => v.y,
            SolveAxis::Z => v.z,
        }
    }
}

/// 一次求解的统计
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IkSolveStats {
    /// 实际执行的迭代次数
    pub iterations: u32,
    /// 最终末端到目标的距离
    pub distance: f32,
    /// 是否达到收敛阈值
    pub converged: bool,
    /// 任意一次迭代中单关节旋转增量的最大值（弧度）
    pub max_joint_delta: f32,
}

// ============================================================================
// IK 求解器
// ============================================================================

/// IK 求解器
#[derive(Clone, Copy, Debug)]
pub struct IkSolver {
    /// 末端到目标距离低于此值视为收敛
    pub convergence_threshold: f32,
    /// 单关节旋转角低于此值时跳过
    pub min_angle: f32,
}

impl Default for IkSolver {
    fn default() -> Self {
        Self::from_config()
    }
}

impl IkSolver {
    pub fn new(convergence_threshold: f32, min_angle: f32) -> Self {
        Self { convergence_threshold, min_angle }
    }

    /// 使用全局配置中的阈值
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(config.ik_convergence_threshold, config.ik_min_angle)
    }

    /// 求解 IK，`target_node` 为挂载组件的目标节点
    pub fn solve(&self, ik: &IkTargetComponent, target_node: usize, pose: &mut impl IkPose) -> IkSolveStats {
        let mut stats = IkSolveStats::default();

        // 初始化 IK 链：清空 IK 旋转，记录动画姿态
        let mut chain_states: Vec<IkChainState> = ik
            .chain
            .iter()
            .map(|link| {
                pose.set_ik_rotation(link.node_index, Quat::IDENTITY);
                let base_rotation = pose.base_rotation(link.node_index);
                let prev_angle = Self::decompose_rotation(Mat3::from_quat(base_rotation), Vec3::ZERO);
                let plane_mode_angle = link
                    .limit
                    .and_then(|limit| Self::detect_plane_solve_axis(&limit))
                    .map_or(0.0, |axis| axis.component(prev_angle));
                IkChainState {
                    base_rotation,
                    ik_rotation: Quat::IDENTITY,
                    prev_angle,
                    plane_mode_angle,
                    best_ik_rotation: Quat::IDENTITY,
                }
            })
            .collect();

        let mut best_distance = self.distance(ik, target_node, pose);
        stats.distance = best_distance;
        if best_distance < self.convergence_threshold {
            stats.converged = true;
            return stats;
        }

        // 迭代求解
        for iteration in 0..ik.loop_count {
            self.solve_iteration(ik, target_node, iteration, &mut chain_states, pose, &mut stats);
            stats.iterations = iteration + 1;

            let distance = self.distance(ik, target_node, pose);
            if distance < best_distance {
                best_distance = distance;
                // 保存最佳结果
                for state in chain_states.iter_mut() {
                    state.best_ik_rotation = state.ik_rotation;
                }
                if distance < self.convergence_threshold {
                    stats.converged = true;
                    break;
                }
            } else {
                // 恢复最佳结果并退出
                for (link, state) in ik.chain.iter().zip(chain_states.iter_mut()) {
                    state.ik_rotation = state.best_ik_rotation;
                    pose.set_ik_rotation(link.node_index, state.ik_rotation);
                }
                break;
            }
        }

        stats.distance = best_distance;
        stats
    }

    fn distance(&self, ik: &IkTargetComponent, target_node: usize, pose: &impl IkPose) -> f32 {
        let target_pos = pose.world_transform(target_node).col(3).truncate();
        let effector_pos = pose.world_transform(ik.effector_node_index).col(3).truncate();
        (target_pos - effector_pos).length()
    }

    /// 单次迭代求解
    fn solve_iteration(
        &self,
        ik: &IkTargetComponent,
        target_node: usize,
        iteration: u32,
        chain_states: &mut [IkChainState],
        pose: &mut impl IkPose,
        stats: &mut IkSolveStats,
    ) {
        // 从末端向根方向
        for (link, state) in ik.chain.iter().zip(chain_states.iter_mut()).rev() {
            if link.node_index == target_node {
                continue;
            }

            let effector_pos = pose.world_transform(ik.effector_node_index).col(3).truncate();
            let target_pos = pose.world_transform(target_node).col(3).truncate();
            let inv_link = pose.world_transform(link.node_index).inverse();

            let ik_vec = inv_link.transform_point3(effector_pos).normalize_or_zero();
            let target_vec = inv_link.transform_point3(target_pos).normalize_or_zero();

            if ik_vec.length_squared() < 1e-8 || target_vec.length_squared() < 1e-8 {
                continue;
            }

            let angle = ik_vec.dot(target_vec).clamp(-1.0, 1.0).acos();
            if angle < self.min_angle {
                continue;
            }
            let angle = angle.min(ik.limit_radian);

            // 检查是否使用单轴模式
            if let Some(limit) = &link.limit {
                if let Some(axis) = Self::detect_plane_solve_axis(limit) {
                    self.solve_plane(link, limit, axis, angle, ik_vec, target_vec, iteration, state, pose, stats);
                    continue;
                }
            }

            // 通用 3 轴求解
            let axis = ik_vec.cross(target_vec).normalize_or_zero();
            if axis.length_squared() < 1e-8 {
                continue;
            }

            let current = state.base_rotation * state.ik_rotation;
            let mut total = current * Quat::from_axis_angle(axis, angle);

            // 应用角度限制
            if let Some(limit) = &link.limit {
                let euler = Self::decompose_rotation(Mat3::from_quat(total), state.prev_angle);
                let mut clamped = euler.clamp(limit.min, limit.max);

                // 增量限制
                let delta = clamped - state.prev_angle;
                let step = Vec3::splat(ik.limit_radian);
                clamped = delta.clamp(-step, step) + state.prev_angle;

                // 逐分量夹紧后合成角仍可能超出，按旋转角再限制一次
                let limited = Quat::from_euler(EulerRot::ZYX, clamped.z, clamped.y, clamped.x);
                total = Self::limit_step(current, limited, ik.limit_radian);
                state.prev_angle = Self::decompose_rotation(Mat3::from_quat(total), clamped);
            }

            stats.max_joint_delta = stats.max_joint_delta.max(current.angle_between(total));
            state.ik_rotation = (state.base_rotation.inverse() * total).normalize();
            pose.set_ik_rotation(link.node_index, state.ik_rotation);
        }
    }

    /// 单轴求解（膝盖等关节）
    #[allow(clippy::too_many_arguments)]
    fn solve_plane(
        &self,
        link: &IkChainLink,
        limit: &IkLimit,
        solve_axis: SolveAxis,
        angle: f32,
        ik_vec: Vec3,
        target_vec: Vec3,
        iteration: u32,
        state: &mut IkChainState,
        pose: &mut impl IkPose,
        stats: &mut IkSolveStats,
    ) {
        let rotate_axis = solve_axis.vector();

        // 测试两个方向
        let rot_pos = Quat::from_axis_angle(rotate_axis, angle);
        let rot_neg = Quat::from_axis_angle(rotate_axis, -angle);
        let dot_pos = (rot_pos * ik_vec).dot(target_vec);
        let dot_neg = (rot_neg * ik_vec).dot(target_vec);

        let previous = state.plane_mode_angle;
        let mut new_angle = previous;
        if dot_pos > dot_neg {
            new_angle += angle;
        } else {
            new_angle -= angle;
        }

        let limit_min = solve_axis.component(limit.min);
        let limit_max = solve_axis.component(limit.max);

        // 第 0 次迭代：超出范围时尝试反向
        if iteration == 0 && (new_angle < limit_min || new_angle > limit_max) {
            if -new_angle > limit_min && -new_angle < limit_max {
                new_angle = -new_angle;
            } else {
                let half = (limit_min + limit_max) * 0.5;
                if (half - new_angle).abs() > (half + new_angle).abs() {
                    new_angle = -new_angle;
                }
            }
        }

        new_angle = new_angle.clamp(limit_min, limit_max);
        // 范围外的初始姿态也只能逐步靠近边界
        new_angle = new_angle.clamp(previous - angle, previous + angle);
        state.plane_mode_angle = new_angle;

        let current = state.base_rotation * state.ik_rotation;
        let total = Self::limit_step(current, Quat::from_axis_angle(rotate_axis, new_angle), angle);
        stats.max_joint_delta = stats.max_joint_delta.max(current.angle_between(total));

        state.ik_rotation = (state.base_rotation.inverse() * total).normalize();
        pose.set_ik_rotation(link.node_index, state.ik_rotation);
    }

    /// 把 `current → total` 的旋转角限制在 `max_angle` 以内
    fn limit_step(current: Quat, total: Quat, max_angle: f32) -> Quat {
        let step = current.angle_between(total);
        if step <= max_angle || step < 1e-8 {
            return total;
        }
        current.slerp(total, max_angle / step).normalize()
    }

    /// 只有一个轴有限制范围时使用单轴模式
    fn detect_plane_solve_axis(limit: &IkLimit) -> Option<SolveAxis> {
        let active = |min: f32, max: f32| min != 0.0 || max != 0.0;
        let x = active(limit.min.x, limit.max.x);
        let y = active(limit.min.y, limit.max.y);
        let z = active(limit.min.z, limit.max.z);

        match (x, y, z) {
            (true, false, false) => Some(SolveAxis::X),
            (false, true, false) => Some(SolveAxis::Y),
            (false, false, true) => Some(SolveAxis::Z),
            _ => None,
        }
    }

    /// 从旋转矩阵分解欧拉角（R = Rz * Ry * Rx）
    fn decompose_rotation(m: Mat3, prev: Vec3) -> Vec3 {
        let epsilon = 1.0e-6_f32;
        let sy = -m.col(0).z;

        let result = if (1.0 - sy.abs()) < epsilon {
            // 万向节锁
            let ry = sy.clamp(-1.0, 1.0).asin();
            let sx = prev.x.sin();
            let sz = prev.z.sin();

            if sx.abs() < sz.abs() {
                if prev.x.cos() > 0.0 {
                    Vec3::new(0.0, ry, (-m.col(1).x).clamp(-1.0, 1.0).asin())
                } else {
                    Vec3::new(PI, ry, m.col(1).x.clamp(-1.0, 1.0).asin())
                }
            } else if prev.z.cos() > 0.0 {
                Vec3::new((-m.col(2).y).clamp(-1.0, 1.0).asin(), ry, 0.0)
            } else {
                Vec3::new(m.col(2).y.clamp(-1.0, 1.0).asin(), ry, PI)
            }
        } else {
            Vec3::new(
                m.col(1).z.atan2(m.col(2).z),
                sy.clamp(-1.0, 1.0).asin(),
                m.col(0).y.atan2(m.col(0).x),
            )
        };

        // 寻找最接近 prev 的解
        Self::find_closest_euler(result, prev)
    }

    /// 找到最接近 prev 的等价欧拉角
    fn find_closest_euler(r: Vec3, prev: Vec3) -> Vec3 {
        let candidates = [
            r,
            Vec3::new(r.x + PI, PI - r.y, r.z + PI),
            Vec3::new(r.x + PI, PI - r.y, r.z - PI),
            Vec3::new(r.x + PI, -PI - r.y, r.z + PI),
            Vec3::new(r.x + PI, -PI - r.y, r.z - PI),
            Vec3::new(r.x - PI, PI - r.y, r.z + PI),
            Vec3::new(r.x - PI, PI - r.y, r.z - PI),
            Vec3::new(r.x - PI, -PI - r.y, r.z + PI),
            Vec3::new(r.x - PI, -PI - r.y, r.z - PI),
        ];

        candidates
            .iter()
            .copied()
            .min_by(|a, b| Self::euler_error(*a, prev).total_cmp(&Self::euler_error(*b, prev)))
            .unwrap_or(r)
    }

    fn euler_error(a: Vec3, b: Vec3) -> f32 {
        Self::angle_diff(a.x, b.x).abs() + Self::angle_diff(a.y, b.y).abs() + Self::angle_diff(a.z, b.z).abs()
    }

    /// 角度差（考虑周期性）
    fn angle_diff(a: f32, b: f32) -> f32 {
        let diff = a.rem_euclid(2.0 * PI) - b.rem_euclid(2.0 * PI);
        if diff > PI {
            diff - 2.0 * PI
        } else if diff < -PI {
            diff + 2.0 * PI
        } else {
            diff
        }
    }
}
