//! Plays scripted allocation sequences against each allocator of `bufalloc`
//! and prints the addresses they hand out.

use std::{io, process, ptr::NonNull};

use argh::FromArgs;
use bufalloc::{AllocError, DEFAULT_ALIGNMENT, LinearAllocator, PoolAllocator, StackAllocator};
use derive_more::{Display, FromStr};
use snafu::{Report, ResultExt as _, Whatever, ensure_whatever};
use tracing::Level;

/// Run the allocator demos over a single backing buffer.
#[derive(Debug, FromArgs)]
struct Args {
    /// length of the backing buffer in bytes (default: 1024)
    #[argh(option, default = "1024")]
    buffer_len: usize,

    /// run only the given demo (linear, stack or pool), may be repeated
    #[argh(option)]
    only: Vec<Demo>,

    /// log every allocator event
    #[argh(switch, short = 'v')]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromStr)]
enum Demo {
    #[display("linear")]
    Linear,
    #[display("stack")]
    Stack,
    #[display("pool")]
    Pool,
}

impl Demo {
    const ALL: [Self; 3] = [Self::Linear, Self::Stack, Self::Pool];
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct Position {
    x: u32,
    y: u32,
}

fn main() {
    let args: Args = argh::from_env();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(&args) {
        let report = Report::from_error(err);
        eprintln!("{report}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Whatever> {
    let demos = if args.only.is_empty() {
        &Demo::ALL[..]
    } else {
        &args.only[..]
    };
    let mut buf = vec![0_u8; args.buffer_len];
    tracing::info!(buffer_len = buf.len(), "running allocator demos");

    println!();
    for &demo in demos {
        println!("# {demo} allocator\n");
        match demo {
            Demo::Linear => demo_linear(&mut buf),
            Demo::Stack => demo_stack(&mut buf),
            Demo::Pool => demo_pool(&mut buf),
        }
        .with_whatever_context(|_| format!("{demo} allocator demo failed"))?;
        println!("\n");
    }

    Ok(())
}

fn demo_linear(buf: &mut [u8]) -> Result<(), Whatever> {
    let mut allocator = LinearAllocator::new(buf);
    let size = size_of::<Position>();

    let pos_1 = place(1, allocator.try_alloc_align(size, DEFAULT_ALIGNMENT), 10, 20)?;
    let _pos_2 = place(2, allocator.try_alloc_align(size, DEFAULT_ALIGNMENT), 33, 33)?;

    allocator.free();
    println!("Allocator freed");

    let pos_3 = place(3, allocator.try_alloc_align(size, DEFAULT_ALIGNMENT), 52, 89)?;
    ensure_whatever!(
        pos_3 == pos_1,
        "position 3 does not reuse the address of position 1"
    );

    Ok(())
}

fn demo_stack(buf: &mut [u8]) -> Result<(), Whatever> {
    let mut allocator = StackAllocator::new(buf);
    let size = size_of::<Position>();

    let _pos_1 = place(1, allocator.try_alloc_align(size, DEFAULT_ALIGNMENT), 10, 20)?;
    let pos_2 = place(2, allocator.try_alloc_align(size, DEFAULT_ALIGNMENT), 90, 100)?;

    allocator
        .try_free(pos_2.as_ptr().cast())
        .whatever_context("failed to free position 2")?;
    println!("Position 2 ({:#010x}) freed", pos_2.as_ptr().addr());

    let pos_3 = place(3, allocator.try_alloc_align(size, DEFAULT_ALIGNMENT), 2, 56)?;
    ensure_whatever!(
        pos_3 == pos_2,
        "position 3 does not reuse the address of position 2"
    );

    allocator.free_all();
    Ok(())
}

fn demo_pool(buf: &mut [u8]) -> Result<(), Whatever> {
    let mut allocator = PoolAllocator::try_new(buf, size_of::<Position>(), 32)
        .whatever_context("failed to create pool allocator")?;
    tracing::info!(
        chunk_size = allocator.chunk_size(),
        chunk_count = allocator.chunk_count(),
        "pool allocator ready"
    );

    let _pos_1 = place(1, allocator.try_alloc(), 10, 20)?;
    let pos_2 = place(2, allocator.try_alloc(), 90, 100)?;

    allocator
        .try_free(pos_2.as_ptr().cast())
        .whatever_context("failed to free position 2")?;
    println!("Position 2 ({:#010x}) freed", pos_2.as_ptr().addr());

    let pos_3 = place(3, allocator.try_alloc(), 2, 56)?;
    ensure_whatever!(
        pos_3 == pos_2,
        "position 3 does not reuse the address of position 2"
    );

    allocator.free_all();
    Ok(())
}

/// Stores a position into freshly allocated memory and prints it.
fn place(
    label: usize,
    ptr: Result<NonNull<u8>, AllocError>,
    x: u32,
    y: u32,
) -> Result<NonNull<Position>, Whatever> {
    let pos = ptr
        .with_whatever_context(|_| format!("failed to allocate position {label}"))?
        .cast::<Position>();

    // The allocation is at least `size_of::<Position>()` bytes long.
    unsafe {
        pos.write_unaligned(Position { x, y });
    }
    let Position { x, y } = unsafe { pos.read_unaligned() };
    println!("Position {label} ({:#010x}): x={x} y={y}", pos.as_ptr().addr());

    Ok(pos)
}
