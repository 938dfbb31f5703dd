use std::cell::RefCell;

use rand::{ SeedableRng, rngs::StdRng };


thread_local! {
  static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_entropy());
}


/// Seed the random number generator of the current thread.
///
/// Everything random in this crate (parameter initialization, synthetic
/// data and shuffling) draws from this generator, so seeding makes a whole
/// training run reproducible.

pub fn manual_seed(seed: u64) {
  RNG.with(|rng| *rng.borrow_mut() = StdRng::seed_from_u64(seed) );
}

pub(crate) fn with_rng<R>(cb: impl FnOnce(&mut StdRng) -> R) -> R {
  RNG.with(|rng| cb(&mut rng.borrow_mut()) )
}


#[inline]
pub fn negative_index(i: isize, n: usize, start_behind: bool) -> usize {
  if i < 0 {
    let offset = if start_behind { 1 } else { 0 };
    (n as isize + i + offset) as usize
  } else {
    i as usize
  }
}
