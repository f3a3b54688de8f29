//! Contact force recovery: `Fc = D_u gamma_u / h` over the rigid dofs.

use log::{trace, warn};
use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;

use super::parallel;
use crate::core::data_manager::DataManager;

/// Per-body contact force and torque from the unilateral block of `d`.
///
/// Only the first `6 * num_bodies` rows and the first `num_unilaterals`
/// columns take part; node dofs and bilateral rows are ignored.
pub fn recover_contact_forces(
    d: &CscMatrix<f64>,
    gamma: &DVector<f64>,
    num_bodies: usize,
    num_unilaterals: usize,
    step_size: f64,
    parallel: bool,
) -> DVector<f64> {
    debug_assert!(step_size > 0.0);
    debug_assert!(num_unilaterals <= d.ncols() && num_unilaterals <= gamma.len());
    let rigid_rows = 6 * num_bodies;
    let mut fc = parallel::scatter_add(num_unilaterals, rigid_rows, parallel, |j, acc| {
        let g = gamma[j];
        if g == 0.0 {
            return;
        }
        let col = d.col(j);
        for (i, value) in col.row_indices().iter().zip(col.values()) {
            if *i < rigid_rows {
                acc[*i] += value * g;
            }
        }
    });
    fc /= step_size;
    fc
}

/// Refreshes the Data Manager's force cache from the last solve and marks
/// it current. Without contacts the cache is zero-filled and no product is
/// formed.
///
/// Does nothing unless the current bodies and contacts have been solved;
/// queries keep answering `NotComputed` until they are.
pub fn calculate_contact_forces(dm: &mut DataManager) {
    if !dm.is_solved() {
        warn!("contact forces requested before the current system was solved");
        return;
    }
    let num_bodies = dm.num_rigid_bodies;
    if dm.num_rigid_contacts == 0 {
        dm.store_contact_forces(DVector::zeros(6 * num_bodies));
        return;
    }
    let fc = recover_contact_forces(
        &dm.host.d,
        &dm.host.gamma,
        num_bodies,
        dm.num_unilaterals,
        dm.settings.step_size,
        dm.settings.parallel,
    );
    trace!("contact forces recovered for {num_bodies} bodies");
    dm.store_contact_forces(fc);
}
