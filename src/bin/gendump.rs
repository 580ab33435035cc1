//! Kernel dump tool.
//!
//! Builds one of the demo kernels, compiles it and prints the IR, the kernel
//! layout and the disassembly.

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use genbe::core::{CompilationSession, GenConfig};
use genbe::gen::GenContext;
use genbe::ir::{
    Function, FunctionBuilder, Instruction, IrResult, MemorySpace, RegisterFamily, Type, Value,
};
use log::info;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Demo {
    /// c[i] = a[i] + b[i]
    Add,
    /// Counted loop with a backward branch
    Loop,
    /// Float multiply-add, fused by selection
    Mad,
    /// Texture sample then typed write
    Texture,
    /// Byte stores through the scatter path
    Bytes,
    All,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Compile demo kernels and dump the Gen code", long_about = None)]
struct Args {
    /// Kernel to compile
    #[arg(value_enum, default_value_t = Demo::All)]
    demo: Demo,

    /// SIMD width (8 or 16), overriding the kernel's request
    #[arg(short = 'w', long)]
    simd_width: Option<u32>,

    /// Private stack bytes per lane
    #[arg(long, default_value_t = 1024)]
    stack_size: u32,

    /// General registers available
    #[arg(long, default_value_t = 128)]
    grf_count: u32,

    /// Keep multiplies and adds separate
    #[arg(long, default_value_t = false)]
    no_fuse: bool,

    /// Print the IR before compiling
    #[arg(long, default_value_t = false)]
    dump_ir: bool,
}

fn vector_add() -> IrResult<Function> {
    let mut b = FunctionBuilder::new("vector_add");
    let (pa, pb, pc) = (
        b.reg(RegisterFamily::DWord),
        b.reg(RegisterFamily::DWord),
        b.reg(RegisterFamily::DWord),
    );
    let (x, y, z) = (
        b.reg(RegisterFamily::DWord),
        b.reg(RegisterFamily::DWord),
        b.reg(RegisterFamily::DWord),
    );
    for arg in [pa, pb, pc] {
        b.input(arg);
    }
    let (tx, ty, tz) = (b.tuple(&[x]), b.tuple(&[y]), b.tuple(&[z]));
    b.append(Instruction::load(Type::F32, tx, pa, MemorySpace::Global, 1, 4));
    b.append(Instruction::load(Type::F32, ty, pb, MemorySpace::Global, 1, 4));
    b.append(Instruction::add(Type::F32, z, x, y));
    b.append(Instruction::store(Type::F32, tz, pc, MemorySpace::Global, 1, 4));
    b.finish()
}

fn counted_loop() -> IrResult<Function> {
    let mut b = FunctionBuilder::new("counted_loop");
    let n = b.uniform_reg(RegisterFamily::DWord);
    let i = b.uniform_reg(RegisterFamily::DWord);
    let one = b.uniform_reg(RegisterFamily::DWord);
    let more = b.reg(RegisterFamily::Bool);
    b.input(n);
    b.output(i);

    let (entry, body, exit) = (b.new_label(), b.new_label(), b.new_label());
    let zero_imm = b.immediate(Value::U32(0));
    let one_imm = b.immediate(Value::U32(1));

    b.start_block(entry);
    b.append(Instruction::loadi(Type::U32, i, zero_imm));
    b.append(Instruction::loadi(Type::U32, one, one_imm));
    b.append(Instruction::bra(exit));

    b.start_block(body);
    b.append(Instruction::add(Type::U32, i, i, one));

    b.start_block(exit);
    b.append(Instruction::lt(Type::U32, more, i, n));
    b.append(Instruction::bra_if(body, more));
    b.finish()
}

fn multiply_add() -> IrResult<Function> {
    let mut b = FunctionBuilder::new("multiply_add");
    let regs: Vec<_> = (0..5).map(|_| b.reg(RegisterFamily::DWord)).collect();
    let (a, x, c, t, d) = (regs[0], regs[1], regs[2], regs[3], regs[4]);
    for arg in [a, x, c] {
        b.input(arg);
    }
    b.output(d);
    b.append(Instruction::mul(Type::F32, t, a, x));
    b.append(Instruction::add(Type::F32, d, t, c));
    b.finish()
}

fn texture_copy() -> IrResult<Function> {
    let mut b = FunctionBuilder::new("texture_copy");
    let (u, v) = (b.reg(RegisterFamily::DWord), b.reg(RegisterFamily::DWord));
    let texel: Vec<_> = (0..4).map(|_| b.reg(RegisterFamily::DWord)).collect();
    b.input(u);
    b.input(v);
    let coords = b.tuple(&[u, v]);
    let dst = b.tuple(&texel);
    let mut payload = vec![u, v];
    payload.extend_from_slice(&texel);
    let src = b.tuple(&payload);
    b.append(Instruction::sample(0, dst, 4, coords, 2));
    b.append(Instruction::typed_write(Type::F32, 1, src, 2, 4));
    b.append(Instruction::fence(MemorySpace::Global));
    b.finish()
}

fn byte_store() -> IrResult<Function> {
    let mut b = FunctionBuilder::new("byte_store");
    let addr = b.reg(RegisterFamily::DWord);
    let lo = b.reg(RegisterFamily::Byte);
    let hi = b.reg(RegisterFamily::Byte);
    b.input(addr);
    b.input(lo);
    b.input(hi);
    let values = b.tuple(&[lo, hi]);
    b.append(Instruction::store(Type::U8, values, addr, MemorySpace::Global, 2, 1));
    b.finish()
}

fn demos(demo: Demo) -> IrResult<Vec<Function>> {
    Ok(match demo {
        Demo::Add => vec![vector_add()?],
        Demo::Loop => vec![counted_loop()?],
        Demo::Mad => vec![multiply_add()?],
        Demo::Texture => vec![texture_copy()?],
        Demo::Bytes => vec![byte_store()?],
        Demo::All => vec![
            vector_add()?,
            counted_loop()?,
            multiply_add()?,
            texture_copy()?,
            byte_store()?,
        ],
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    info!("{:?}", args);

    let mut config = GenConfig::default()
        .with_stack_size(args.stack_size)
        .with_grf_count(args.grf_count)
        .with_mad_fusion(!args.no_fuse);
    if let Some(width) = args.simd_width {
        config = config.with_simd_width(width);
    }

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    for func in demos(args.demo)? {
        if args.dump_ir {
            println!("{func}");
        }
        match GenContext::new(&func, &session, &config).emit_code() {
            Ok(kernel) => {
                print!("{kernel}");
                println!("{}", kernel.disassemble()?);
            }
            Err(e) => {
                eprintln!("Error compiling {}: {}", func.name(), e);
                std::process::exit(1);
            }
        }
    }

    println!("{}", session.stats());
    Ok(())
}
