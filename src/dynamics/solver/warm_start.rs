use std::collections::HashMap;

use log::trace;
use nalgebra::DVector;

use crate::{core::soa::ContactBuffers, utils::allocator::EntityId};

/// Key of a contact across steps: the body pair plus the ordinal of the
/// contact among the contacts of that pair, in report order.
type ContactKey = (EntityId, EntityId, usize);

fn contact_keys(contacts: &ContactBuffers) -> impl Iterator<Item = ContactKey> + '_ {
    let mut seen: HashMap<(EntityId, EntityId), usize> = HashMap::new();
    contacts.ids.iter().map(move |&(a, b)| {
        let ordinal = seen.entry((a, b)).or_insert(0);
        let key = (a, b, *ordinal);
        *ordinal += 1;
        key
    })
}

/// Multipliers of the previous solve, used as the next initial guess.
///
/// Contact multipliers are matched by body pair. Bilateral multipliers are
/// reused only when the bilateral row count did not change.
#[derive(Debug, Clone, Default)]
pub struct WarmStartCache {
    contacts: HashMap<ContactKey, [f64; 3]>,
    bilateral: Vec<f64>,
}

impl WarmStartCache {
    pub fn clear(&mut self) {
        self.contacts.clear();
        self.bilateral.clear();
    }

    pub fn num_contacts(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty() && self.bilateral.is_empty()
    }

    pub(crate) fn seed(
        &self,
        contacts: &ContactBuffers,
        rows_per_contact: usize,
        num_unilaterals: usize,
        num_constraints: usize,
    ) -> DVector<f64> {
        let mut gamma = DVector::zeros(num_constraints);
        let mut hits = 0;
        for (i, key) in contact_keys(contacts).enumerate() {
            let start = i * rows_per_contact;
            if start + rows_per_contact > num_unilaterals {
                break;
            }
            if let Some(cached) = self.contacts.get(&key) {
                gamma.as_mut_slice()[start..start + rows_per_contact]
                    .copy_from_slice(&cached[..rows_per_contact]);
                hits += 1;
            }
        }
        let num_bilaterals = num_constraints - num_unilaterals;
        if self.bilateral.len() == num_bilaterals {
            gamma.as_mut_slice()[num_unilaterals..].copy_from_slice(&self.bilateral);
        }
        trace!("warm start: {hits}/{} contacts seeded", contacts.len());
        gamma
    }

    pub(crate) fn store(
        &mut self,
        contacts: &ContactBuffers,
        rows_per_contact: usize,
        num_unilaterals: usize,
        gamma: &DVector<f64>,
    ) {
        self.contacts.clear();
        for (i, key) in contact_keys(contacts).enumerate() {
            let start = i * rows_per_contact;
            if start + rows_per_contact > num_unilaterals {
                break;
            }
            let mut cached = [0.0; 3];
            cached[..rows_per_contact]
                .copy_from_slice(&gamma.as_slice()[start..start + rows_per_contact]);
            self.contacts.insert(key, cached);
        }
        self.bilateral = gamma.as_slice()[num_unilaterals..].to_vec();
    }
}
