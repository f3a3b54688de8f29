use glam::DVec3;

use crate::{
    core::data_manager::DataManager,
    utils::math::angular_velocity_to_quat,
};

/// Semi-implicit Euler: the constrained velocities of the last solve are
/// written back to bodies and nodes, then positions advance with them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Integrator;

impl Integrator {
    pub fn advance(dm: &mut DataManager) {
        let step = dm.settings.step_size;
        let layout = dm.host.layout;
        let v = &dm.host.v;
        if v.len() != layout.num_dof() {
            return;
        }
        let read = |base: usize| DVec3::new(v[base], v[base + 1], v[base + 2]);

        for (i, id) in dm.body_index.ids().iter().enumerate() {
            let Some(body) = dm.bodies.get_mut(*id) else {
                continue;
            };
            if body.fixed {
                continue;
            }
            body.velocity.linear = read(6 * i);
            body.velocity.angular = read(6 * i + 3);

            let transform = &mut body.transform;
            transform.position += body.velocity.linear * step;
            let delta = angular_velocity_to_quat(body.velocity.angular, step);
            transform.rotation = (delta * transform.rotation).normalize();
        }

        let node_base = layout.num_rigid_dof();
        let fea_nodes = dm.fea_container.iter_mut().flat_map(|fea| fea.nodes.iter_mut());
        let granular_nodes = dm
            .node_container
            .iter_mut()
            .flat_map(|nodes| nodes.nodes.iter_mut());
        for (k, node) in fea_nodes.chain(granular_nodes).enumerate() {
            if node.fixed {
                continue;
            }
            node.velocity = read(node_base + 3 * k);
            node.position += node.velocity * step;
        }
    }
}
