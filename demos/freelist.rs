use std::{io::Read, ptr};

use firstfit::{FreeListAllocator, SbrkHeap};

/// Waits for ENTER when started with `--step`, so the heap can be inspected
/// with `pmap`, `gdb` and friends between steps.
fn pause(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    SbrkHeap::current_break(),
  );
}

fn print_chain(allocator: &FreeListAllocator<SbrkHeap>) {
  for block in allocator.blocks() {
    println!(
      "    {:#x}  {:>6} bytes  {}",
      block.payload,
      block.size,
      if block.is_free { "free" } else { "used" }
    );
  }
  println!("    {:?}", allocator.stats());
}

fn main() {
  let step = std::env::args().any(|arg| arg == "--step");
  let mut allocator = FreeListAllocator::new(SbrkHeap::new());

  print_program_break("start");
  pause(step);

  // 1) Two small blocks, appended at the end of the heap.
  let first = allocator.allocate(8).expect("sbrk refused 8 bytes");
  let second = allocator.allocate(16).expect("sbrk refused 16 bytes");
  unsafe {
    first.as_ptr().cast::<u64>().write(0xDEADBEEF);
    ptr::write_bytes(second.as_ptr(), 0xAB, 16);
  }
  println!("\n[1] allocate(8) = {first:?}, allocate(16) = {second:?}");
  print_chain(&allocator);
  pause(step);

  // 2) Releasing the first leaves it free but separate: its neighbour is in use.
  unsafe { allocator.release(Some(first)).expect("first is live") };
  println!("\n[2] release(first)");
  print_chain(&allocator);
  pause(step);

  // 3) Releasing the second merges both into one block.
  unsafe { allocator.release(Some(second)).expect("second is live") };
  println!("\n[3] release(second)");
  print_chain(&allocator);
  pause(step);

  // 4) A zeroed allocation reuses the merged block and splits it.
  let zeroed = allocator.allocate_zeroed(4, 4).expect("zeroed allocation");
  println!(
    "\n[4] allocate_zeroed(4, 4) = {zeroed:?}, reused first block? {}",
    zeroed == first
  );
  print_chain(&allocator);
  pause(step);

  // 5) Growing past every free block moves the data to the end of the heap.
  print_program_break("before large resize");
  let big = unsafe { allocator.reallocate(Some(zeroed), 64 * 1024) }.expect("64 KiB");
  println!("\n[5] reallocate(zeroed, 64 KiB) = {big:?}");
  print_program_break("after large resize");
  print_chain(&allocator);
  pause(step);

  // 6) Shrinking in place hands the tail back as a free block.
  let shrunk = unsafe { allocator.reallocate(Some(big), 1024) }.expect("shrink");
  println!("\n[6] reallocate(big, 1 KiB) = {shrunk:?}, same pointer? {}", shrunk == big);
  print_chain(&allocator);

  println!("\n[7] End of demo. The break is never lowered; the OS reclaims it at exit.");
}
