use std::{ptr::NonNull, slice};

use firstfit::{AllocError, BlockInfo, FixedHeap, FreeListAllocator, META_SIZE};
use proptest::prelude::*;

const CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone)]
enum Op {
  Allocate(usize),
  Zeroed(usize, usize),
  Release(usize),
  Resize(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    3 => (1..600usize).prop_map(Op::Allocate),
    1 => (1..16usize, 1..40usize).prop_map(|(count, size)| Op::Zeroed(count, size)),
    3 => any::<usize>().prop_map(Op::Release),
    2 => (any::<usize>(), 0..900usize).prop_map(|(index, size)| Op::Resize(index, size)),
  ]
}

struct Live {
  payload: NonNull<u8>,
  size: usize,
  fill: u8,
}

fn fill(live: &Live) {
  unsafe { live.payload.as_ptr().write_bytes(live.fill, live.size) };
}

fn check_heap(
  allocator: &FreeListAllocator<FixedHeap>,
  live: &[Live],
) {
  let blocks: Vec<BlockInfo> = allocator.blocks().collect();

  for pair in blocks.windows(2) {
    assert_eq!(pair[0].end(), pair[1].address);
    assert!(!(pair[0].is_free && pair[1].is_free), "adjacent free: {pair:?}");
  }

  if let Some(head) = allocator.head() {
    let span = allocator.source().current_break().as_ptr() as usize - head.as_ptr() as usize;
    let total: usize = blocks.iter().map(|block| block.size + META_SIZE).sum();
    assert_eq!(total, span);
  }

  let mut ranges: Vec<(usize, usize)> = live
    .iter()
    .map(|live| {
      let start = live.payload.as_ptr() as usize;
      (start, start + live.size)
    })
    .collect();
  ranges.sort_unstable();
  for pair in ranges.windows(2) {
    assert!(pair[0].1 <= pair[1].0, "overlapping payloads {pair:?}");
  }

  for live in live {
    let bytes = unsafe { slice::from_raw_parts(live.payload.as_ptr(), live.size) };
    assert!(bytes.iter().all(|&byte| byte == live.fill));
    let block = blocks
      .iter()
      .find(|block| block.payload == live.payload.as_ptr() as usize)
      .unwrap();
    assert!(!block.is_free);
    assert!(block.size >= live.size);
  }
}

proptest! {
  #[test]
  fn random_workloads_keep_the_heap_sound(ops in prop::collection::vec(op(), 1..120)) {
    let mut allocator = FreeListAllocator::new(FixedHeap::with_capacity(CAPACITY).unwrap());
    let mut live: Vec<Live> = Vec::new();

    for (step, op) in ops.into_iter().enumerate() {
      let tag = (step % 251) as u8 + 1;

      match op {
        Op::Allocate(size) => match allocator.allocate(size) {
          Ok(payload) => {
            let entry = Live { payload, size, fill: tag };
            fill(&entry);
            live.push(entry);
          }
          Err(error) => prop_assert!(matches!(error, AllocError::OutOfMemory(_))),
        },
        Op::Zeroed(count, size) => match allocator.allocate_zeroed(count, size) {
          Ok(payload) => {
            let entry = Live { payload, size: count * size, fill: 0 };
            live.push(entry);
          }
          Err(error) => prop_assert!(matches!(error, AllocError::OutOfMemory(_))),
        },
        Op::Release(index) if !live.is_empty() => {
          let entry = live.swap_remove(index % live.len());
          prop_assert_eq!(unsafe { allocator.release(Some(entry.payload)) }, Ok(()));
        }
        Op::Resize(index, size) if !live.is_empty() => {
          let index = index % live.len();
          let old = &live[index];
          match unsafe { allocator.reallocate(Some(old.payload), size) } {
            Ok(payload) => {
              let kept = old.size.min(size);
              let prefix = unsafe { slice::from_raw_parts(payload.as_ptr(), kept) };
              prop_assert!(prefix.iter().all(|&byte| byte == old.fill));

              let entry = Live { payload, size, fill: tag };
              fill(&entry);
              live[index] = entry;
            }
            Err(error) => prop_assert!(matches!(error, AllocError::OutOfMemory(_))),
          }
        }
        Op::Release(_) | Op::Resize(..) => {}
      }

      check_heap(&allocator, &live);
    }

    for entry in live.drain(..) {
      unsafe { allocator.release(Some(entry.payload)).unwrap() };
    }
    let stats = allocator.stats();
    prop_assert!(stats.blocks <= 1);
    prop_assert_eq!(stats.used_bytes, 0);
  }
}
