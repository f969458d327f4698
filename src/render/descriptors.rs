//! Per-scene descriptor allocation with fixed quotas.
//!
//! A scene declares up front how many descriptors of each type and how many sets
//! it is going to need, exactly like sizing a `VkDescriptorPool`. Sets are then
//! allocated [`MAX_FRAMES_IN_FLIGHT`] at a time, one per frame in flight, and every
//! allocation is charged against the quota. Running past the quota is an error
//! instead of silently growing. The sets themselves come from vulkano's
//! [`StandardDescriptorSetAllocator`].

use std::{collections::HashMap, sync::Arc};

use vulkano::descriptor_set::{
  DescriptorSet,
  WriteDescriptorSet,
  allocator::StandardDescriptorSetAllocator,
  layout::{DescriptorSetLayout, DescriptorType},
};

use crate::{
  core::frames::MAX_FRAMES_IN_FLIGHT,
  error::{GpuResultExt, RenderError, Result},
};

/// Remaining capacity of a descriptor pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolBudget {
  max_sets:    u32,
  sets_used:   u32,
  descriptors: HashMap<DescriptorType, u32>,
}

impl PoolBudget {
  pub fn new(pool_sizes: &[(DescriptorType, u32)], max_sets: u32) -> Self {
    let mut descriptors = HashMap::new();
    for &(ty, count) in pool_sizes {
      *descriptors.entry(ty).or_insert(0) += count;
    }

    Self {
      max_sets,
      sets_used: 0,
      descriptors,
    }
  }

  pub fn remaining_sets(&self) -> u32 {
    self.max_sets - self.sets_used
  }

  pub fn remaining(&self, ty: DescriptorType) -> u32 {
    self.descriptors.get(&ty).copied().unwrap_or(0)
  }

  /// Charges `set_count` sets, each needing `per_set` descriptors. Nothing is
  /// charged if any part of the request does not fit.
  pub fn reserve(&mut self, per_set: &[(DescriptorType, u32)], set_count: u32) -> Result<()> {
    if set_count > self.remaining_sets() {
      return Err(RenderError::DescriptorSetsExhausted {
        requested: set_count,
        available: self.remaining_sets(),
      });
    }

    let mut needed: HashMap<DescriptorType, u32> = HashMap::new();
    for &(ty, count) in per_set {
      *needed.entry(ty).or_insert(0) += count * set_count;
    }

    if let Some((&ty, &requested)) = needed
      .iter()
      .find(|&(ty, requested)| *requested > self.remaining(*ty))
    {
      return Err(RenderError::DescriptorsExhausted {
        ty,
        requested,
        available: self.remaining(ty),
      });
    }

    for (ty, requested) in needed {
      if let Some(left) = self.descriptors.get_mut(&ty) {
        *left -= requested;
      }
    }
    self.sets_used += set_count;
    Ok(())
  }
}

/// Descriptor counts one set of `layout` consumes.
pub fn layout_requirements(layout: &DescriptorSetLayout) -> Vec<(DescriptorType, u32)> {
  layout
    .bindings()
    .values()
    .map(|binding| (binding.descriptor_type, binding.descriptor_count))
    .collect()
}

/// The pool a scene allocates from: absent until created, and forgotten again
/// when destroyed.
#[derive(Debug, Clone, Default)]
pub struct DescriptorQuota {
  budget: Option<PoolBudget>,
}

impl DescriptorQuota {
  /// Sets the quota. Replaces any previous pool.
  pub fn create_pool(&mut self, pool_sizes: &[(DescriptorType, u32)], max_sets: u32) {
    log::debug!("Descriptor pool created: {pool_sizes:?}, max {max_sets} sets");
    self.budget = Some(PoolBudget::new(pool_sizes, max_sets));
  }

  pub fn has_pool(&self) -> bool {
    self.budget.is_some()
  }

  pub fn budget(&self) -> Option<&PoolBudget> {
    self.budget.as_ref()
  }

  /// Charges one set per frame in flight, each needing `per_set` descriptors.
  pub fn reserve_per_frame(&mut self, per_set: &[(DescriptorType, u32)]) -> Result<()> {
    self
      .budget
      .as_mut()
      .ok_or(RenderError::NoDescriptorPool)?
      .reserve(per_set, MAX_FRAMES_IN_FLIGHT as u32)
  }

  /// Releases the whole quota.
  pub fn destroy_pool(&mut self) {
    if self.budget.take().is_some() {
      log::debug!("Descriptor pool destroyed");
    }
  }
}

/// Hands out per-frame descriptor sets against a fixed quota.
pub struct DescriptorAllocator {
  allocator: Arc<StandardDescriptorSetAllocator>,
  quota:     DescriptorQuota,
}

impl DescriptorAllocator {
  pub fn new(allocator: Arc<StandardDescriptorSetAllocator>) -> Self {
    Self {
      allocator,
      quota: DescriptorQuota::default(),
    }
  }

  pub fn create_pool(&mut self, pool_sizes: &[(DescriptorType, u32)], max_sets: u32) {
    self.quota.create_pool(pool_sizes, max_sets);
  }

  /// Allocates one set per frame in flight. `writes(frame)` returns the writes for
  /// the set used by `frame`.
  pub fn allocate_per_frame<F>(
    &mut self,
    layout: &Arc<DescriptorSetLayout>,
    mut writes: F,
  ) -> Result<Vec<Arc<DescriptorSet>>>
  where
    F: FnMut(usize) -> Vec<WriteDescriptorSet>,
  {
    self.quota.reserve_per_frame(&layout_requirements(layout))?;

    (0..MAX_FRAMES_IN_FLIGHT)
      .map(|frame| {
        DescriptorSet::new(self.allocator.clone(), layout.clone(), writes(frame), [])
          .gpu("allocating descriptor set")
      })
      .collect()
  }

  /// Forgets the pool. Sets already handed out stay valid until dropped.
  pub fn destroy_pool(&mut self) {
    self.quota.destroy_pool();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const UBO_AND_SAMPLER: [(DescriptorType, u32); 2] = [
    (DescriptorType::UniformBuffer, 1),
    (DescriptorType::CombinedImageSampler, 1),
  ];

  #[test]
  fn reserve_charges_sets_and_descriptors() {
    let mut budget = PoolBudget::new(
      &[
        (DescriptorType::UniformBuffer, 4),
        (DescriptorType::CombinedImageSampler, 4),
      ],
      4,
    );

    budget.reserve(&UBO_AND_SAMPLER, 2).unwrap();
    assert_eq!(budget.remaining_sets(), 2);
    assert_eq!(budget.remaining(DescriptorType::UniformBuffer), 2);
    assert_eq!(budget.remaining(DescriptorType::CombinedImageSampler), 2);

    budget.reserve(&UBO_AND_SAMPLER, 2).unwrap();
    assert_eq!(budget.remaining_sets(), 0);
  }

  #[test]
  fn set_count_limit_is_enforced() {
    let mut budget = PoolBudget::new(&[(DescriptorType::UniformBuffer, 100)], 1);
    let err = budget
      .reserve(&[(DescriptorType::UniformBuffer, 1)], 2)
      .unwrap_err();
    assert!(matches!(err, RenderError::DescriptorSetsExhausted {
      requested: 2,
      available: 1
    }));
  }

  #[test]
  fn failed_reservation_charges_nothing() {
    let mut budget = PoolBudget::new(
      &[
        (DescriptorType::UniformBuffer, 2),
        (DescriptorType::CombinedImageSampler, 1),
      ],
      10,
    );
    let before = budget.clone();

    let err = budget.reserve(&UBO_AND_SAMPLER, 2).unwrap_err();
    assert!(matches!(err, RenderError::DescriptorsExhausted {
      ty: DescriptorType::CombinedImageSampler,
      requested: 2,
      available: 1,
    }));
    assert_eq!(budget, before);
  }

  #[test]
  fn types_missing_from_the_pool_have_no_capacity() {
    let mut budget = PoolBudget::new(&[(DescriptorType::UniformBuffer, 2)], 2);
    assert_eq!(budget.remaining(DescriptorType::StorageImage), 0);
    assert!(
      budget
        .reserve(&[(DescriptorType::StorageImage, 1)], 1)
        .is_err()
    );
  }

  #[test]
  fn duplicate_pool_sizes_accumulate() {
    let budget = PoolBudget::new(
      &[
        (DescriptorType::StorageImage, 1),
        (DescriptorType::StorageImage, 2),
      ],
      3,
    );
    assert_eq!(budget.remaining(DescriptorType::StorageImage), 3);
  }

  #[test]
  fn reserving_without_a_pool_fails() {
    let mut quota = DescriptorQuota::default();
    assert!(!quota.has_pool());
    let err = quota.reserve_per_frame(&UBO_AND_SAMPLER).unwrap_err();
    assert!(matches!(err, RenderError::NoDescriptorPool));
  }

  #[test]
  fn destroyed_pool_is_forgotten() {
    let mut quota = DescriptorQuota::default();
    quota.create_pool(&[(DescriptorType::UniformBuffer, 8)], 8);
    quota.destroy_pool();

    assert!(!quota.has_pool());
    assert!(quota.budget().is_none());
    assert!(matches!(
      quota.reserve_per_frame(&[(DescriptorType::UniformBuffer, 1)]),
      Err(RenderError::NoDescriptorPool)
    ));
  }

  #[test]
  fn recreated_pool_has_its_full_quota() {
    let frames = MAX_FRAMES_IN_FLIGHT as u32;
    let sizes = [
      (DescriptorType::UniformBuffer, frames),
      (DescriptorType::CombinedImageSampler, frames),
    ];

    let mut quota = DescriptorQuota::default();
    quota.create_pool(&sizes, frames);
    quota.reserve_per_frame(&UBO_AND_SAMPLER).unwrap();
    assert!(quota.reserve_per_frame(&UBO_AND_SAMPLER).is_err());

    quota.destroy_pool();
    quota.create_pool(&sizes, frames);
    let budget = quota.budget().unwrap();
    assert_eq!(budget.remaining_sets(), frames);
    assert_eq!(budget.remaining(DescriptorType::UniformBuffer), frames);

    quota.reserve_per_frame(&UBO_AND_SAMPLER).unwrap();
    assert_eq!(quota.budget().unwrap().remaining_sets(), 0);
  }
}
