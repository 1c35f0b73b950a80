//! Tree-walking evaluation of compiled programs.

use crate::parser::{AssignOp, BinOp, Builtin, Node, Program, UnOp};
use crate::vm::Vm;
use crate::Real;

/// Iteration bound for `while`; a runaway script degrades instead of
/// wedging the calling thread.
const WHILE_CAP: u64 = 1 << 24;

/// Serialization context for `file_var`/`file_mem` on handle 0.
pub enum SerializeIo {
    Write(Vec<u8>),
    Read { data: Vec<u8>, pos: usize },
}

impl SerializeIo {
    pub(crate) fn write() -> Self {
        SerializeIo::Write(Vec::new())
    }

    pub(crate) fn read(data: Vec<u8>) -> Self {
        SerializeIo::Read { data, pos: 0 }
    }

    fn put(&mut self, value: Real) {
        if let SerializeIo::Write(data) = self {
            data.extend_from_slice(&(value as f32).to_le_bytes());
        }
    }

    /// In read mode, pop the next f32; `None` when exhausted or writing.
    fn get(&mut self) -> Option<Real> {
        if let SerializeIo::Read { data, pos } = self {
            if *pos + 4 <= data.len() {
                let raw = [data[*pos], data[*pos + 1], data[*pos + 2], data[*pos + 3]];
                *pos += 4;
                return Some(f32::from_le_bytes(raw) as Real);
            }
        }
        None
    }

    fn avail(&self) -> Real {
        match self {
            SerializeIo::Write(_) => -1.0,
            SerializeIo::Read { data, pos } => ((data.len() - pos) / 4) as Real,
        }
    }

    fn reading(&self) -> bool {
        matches!(self, SerializeIo::Read { .. })
    }
}

/// Run a full program; the value is that of the last statement.
pub(crate) fn run(vm: &mut Vm, program: &Program) -> Real {
    let mut last = 0.0;
    for stmt in &program.stmts {
        last = eval(vm, stmt);
    }
    last
}

fn truthy(v: Real) -> bool {
    v.abs() > 0.00001
}

fn eval(vm: &mut Vm, node: &Node) -> Real {
    match node {
        Node::Num(v) => *v,
        // string slots evaluate to a handle-like number, as scripts only
        // pass them straight to functions expecting them
        Node::Str(idx) => *idx as Real,
        Node::Var(id) => vm.vars.values[*id],
        Node::Index { base, index } => {
            let addr = eval(vm, base) + eval(vm, index);
            vm.mem.read(addr)
        }
        Node::Assign { target, op, value } => {
            let rhs = eval(vm, value);
            write_lvalue(vm, target, *op, rhs)
        }
        Node::Unary { op, operand } => {
            let v = eval(vm, operand);
            match op {
                UnOp::Neg => -v,
                UnOp::Not => {
                    if truthy(v) {
                        0.0
                    } else {
                        1.0
                    }
                }
            }
        }
        Node::Binary { op, lhs, rhs } => {
            let a = eval(vm, lhs);
            let b = eval(vm, rhs);
            binary(*op, a, b)
        }
        Node::And(lhs, rhs) => {
            if truthy(eval(vm, lhs)) && truthy(eval(vm, rhs)) {
                1.0
            } else {
                0.0
            }
        }
        Node::Or(lhs, rhs) => {
            if truthy(eval(vm, lhs)) || truthy(eval(vm, rhs)) {
                1.0
            } else {
                0.0
            }
        }
        Node::Ternary {
            cond,
            then_branch,
            else_branch,
        } => {
            if truthy(eval(vm, cond)) {
                eval(vm, then_branch)
            } else if let Some(e) = else_branch {
                eval(vm, e)
            } else {
                0.0
            }
        }
        Node::Block(stmts) => {
            let mut last = 0.0;
            for s in stmts {
                last = eval(vm, s);
            }
            last
        }
        Node::Call { func, args } => call(vm, *func, args),
    }
}

fn binary(op: BinOp, a: Real, b: Real) -> Real {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Mod => {
            let bi = b as i64;
            if bi == 0 {
                0.0
            } else {
                ((a as i64) % bi) as Real
            }
        }
        BinOp::Pow => a.powf(b),
        BinOp::Eq => bool_val((a - b).abs() < 0.00001),
        BinOp::Ne => bool_val((a - b).abs() >= 0.00001),
        BinOp::Lt => bool_val(a < b),
        BinOp::Gt => bool_val(a > b),
        BinOp::Le => bool_val(a <= b),
        BinOp::Ge => bool_val(a >= b),
        BinOp::BitAnd => ((a as i64) & (b as i64)) as Real,
        BinOp::BitOr => ((a as i64) | (b as i64)) as Real,
    }
}

fn bool_val(b: bool) -> Real {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Apply an assignment; returns the stored value.
fn write_lvalue(vm: &mut Vm, target: &Node, op: AssignOp, rhs: Real) -> Real {
    match target {
        Node::Var(id) => {
            let old = vm.vars.values[*id];
            let new = combine(op, old, rhs);
            vm.vars.values[*id] = new;
            new
        }
        Node::Index { base, index } => {
            let addr = eval(vm, base) + eval(vm, index);
            let old = vm.mem.read(addr);
            let new = combine(op, old, rhs);
            vm.mem.write(addr, new);
            new
        }
        // the parser rejects other targets
        _ => rhs,
    }
}

fn combine(op: AssignOp, old: Real, rhs: Real) -> Real {
    match op {
        AssignOp::Set => rhs,
        AssignOp::Add => old + rhs,
        AssignOp::Sub => old - rhs,
        AssignOp::Mul => old * rhs,
        AssignOp::Div => old / rhs,
        AssignOp::Mod => binary(BinOp::Mod, old, rhs),
    }
}

/// How a script addressed a slider: through its bound variable, or by a
/// plain number (1-based id or bitmask depending on the function).
enum SliderArg {
    Ref(u32),
    Value(Real),
}

fn slider_arg(vm: &mut Vm, node: &Node) -> SliderArg {
    if let Node::Var(id) = node {
        if let Some(&index) = vm.var_to_slider.get(id) {
            return SliderArg::Ref(index);
        }
    }
    SliderArg::Value(eval(vm, node))
}

fn call(vm: &mut Vm, func: Builtin, args: &[Node]) -> Real {
    let arg = |vm: &mut Vm, i: usize| -> Real {
        if i < args.len() {
            eval(vm, &args[i])
        } else {
            0.0
        }
    };

    match func {
        Builtin::Abs => arg(vm, 0).abs(),
        Builtin::Min => arg(vm, 0).min(arg(vm, 1)),
        Builtin::Max => arg(vm, 0).max(arg(vm, 1)),
        Builtin::Floor => arg(vm, 0).floor(),
        Builtin::Ceil => arg(vm, 0).ceil(),
        Builtin::Sqrt => arg(vm, 0).sqrt(),
        Builtin::Sqr => {
            let v = arg(vm, 0);
            v * v
        }
        Builtin::Sign => {
            let v = arg(vm, 0);
            if v > 0.0 {
                1.0
            } else if v < 0.0 {
                -1.0
            } else {
                0.0
            }
        }
        Builtin::Sin => arg(vm, 0).sin(),
        Builtin::Cos => arg(vm, 0).cos(),
        Builtin::Tan => arg(vm, 0).tan(),
        Builtin::Asin => arg(vm, 0).asin(),
        Builtin::Acos => arg(vm, 0).acos(),
        Builtin::Atan => arg(vm, 0).atan(),
        Builtin::Atan2 => arg(vm, 0).atan2(arg(vm, 1)),
        Builtin::Exp => arg(vm, 0).exp(),
        Builtin::Log => arg(vm, 0).ln(),
        Builtin::Log10 => arg(vm, 0).log10(),
        Builtin::Pow => arg(vm, 0).powf(arg(vm, 1)),
        Builtin::Rand => {
            vm.rng = vm
                .rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let unit = (vm.rng >> 11) as Real / (1u64 << 53) as Real;
            let max = if args.is_empty() { 1.0 } else { arg(vm, 0) };
            unit * max
        }
        Builtin::Loop => {
            if args.len() < 2 {
                return 0.0;
            }
            let count = eval(vm, &args[0]).max(0.0) as u64;
            let mut last = 0.0;
            for _ in 0..count.min(WHILE_CAP) {
                last = eval(vm, &args[1]);
            }
            last
        }
        Builtin::While => {
            // one arg: run until the expression goes falsy;
            // two args: pre-test condition, then body
            if args.is_empty() {
                return 0.0;
            }
            let mut iters = 0u64;
            while truthy(eval(vm, &args[0])) {
                if let Some(body) = args.get(1) {
                    eval(vm, body);
                }
                iters += 1;
                if iters >= WHILE_CAP {
                    break;
                }
            }
            0.0
        }
        Builtin::Printf => {
            if args.is_empty() {
                return 0.0;
            }
            let fmt = match &args[0] {
                Node::Str(idx) => vm.strings[*idx].clone(),
                _ => return 0.0,
            };
            let values: Vec<Real> = args[1..].iter().map(|a| eval(vm, a)).collect();
            let text = format_values(&fmt, &values);
            vm.output.push_str(&text);
            values.len() as Real
        }
        Builtin::SliderShow => {
            if args.is_empty() {
                return 0.0;
            }
            let target = slider_arg(vm, &args[0]);
            let mode = arg(vm, 1);
            let mode = if mode < 0.0 {
                -1
            } else if truthy(mode) {
                1
            } else {
                0
            };
            let index = match target {
                SliderArg::Ref(i) => Some(i),
                SliderArg::Value(v) => {
                    // 1-based slider id
                    let v = v as i64;
                    (1..=crate::vm::MAX_SLIDERS as i64)
                        .contains(&v)
                        .then(|| (v - 1) as u32)
                }
            };
            if let (Some(index), Some(hooks)) = (index, vm.slider_hooks.clone()) {
                hooks.show(index, mode);
            }
            mode as Real
        }
        Builtin::SliderChange => {
            if args.is_empty() {
                return 0.0;
            }
            match slider_arg(vm, &args[0]) {
                SliderArg::Ref(i) => {
                    if let Some(hooks) = vm.slider_hooks.clone() {
                        hooks.changed(i);
                    }
                }
                SliderArg::Value(v) => {
                    if let Some(hooks) = vm.slider_hooks.clone() {
                        for_mask_bits(v, |i| hooks.changed(i));
                    }
                }
            }
            0.0
        }
        Builtin::SliderAutomate => {
            if args.is_empty() {
                return 0.0;
            }
            let touch = if args.len() > 1 {
                Some(truthy(arg(vm, 1)))
            } else {
                None
            };
            let apply = |vm: &Vm, i: u32| {
                if let Some(hooks) = &vm.slider_hooks {
                    match touch {
                        Some(t) => hooks.touch(i, t),
                        None => hooks.automate(i),
                    }
                }
            };
            match slider_arg(vm, &args[0]) {
                SliderArg::Ref(i) => apply(vm, i),
                SliderArg::Value(v) => for_mask_bits(v, |i| apply(vm, i)),
            }
            0.0
        }
        Builtin::FileVar => {
            if args.len() < 2 {
                return 0.0;
            }
            let _handle = arg(vm, 0);
            let Some(mut io) = vm.serialize.take() else {
                return 0.0;
            };
            if io.reading() {
                if let Some(v) = io.get() {
                    vm.serialize = Some(io);
                    write_lvalue(vm, &args[1], AssignOp::Set, v);
                    return 1.0;
                }
            } else {
                let v = eval(vm, &args[1]);
                io.put(v);
            }
            vm.serialize = Some(io);
            1.0
        }
        Builtin::FileMem => {
            if args.len() < 3 {
                return 0.0;
            }
            let _handle = arg(vm, 0);
            let addr = arg(vm, 1);
            let count = arg(vm, 2).max(0.0) as u64;
            let Some(mut io) = vm.serialize.take() else {
                return 0.0;
            };
            if io.reading() {
                for k in 0..count {
                    match io.get() {
                        Some(v) => vm.mem.write(addr + k as f64, v),
                        None => break,
                    }
                }
            } else {
                for k in 0..count {
                    io.put(vm.mem.read(addr + k as f64));
                }
            }
            vm.serialize = Some(io);
            count as Real
        }
        Builtin::FileAvail => vm
            .serialize
            .as_ref()
            .map(|io| io.avail())
            .unwrap_or(0.0),
        Builtin::MidiSend => {
            let offset = arg(vm, 0).max(0.0) as u32;
            let msg1 = arg(vm, 1) as i64 as u8;
            let (b2, b3) = if args.len() >= 4 {
                (arg(vm, 2) as i64 as u8, arg(vm, 3) as i64 as u8)
            } else {
                let packed = arg(vm, 2) as i64;
                ((packed & 0xff) as u8, ((packed >> 8) & 0xff) as u8)
            };
            match vm.midi_hooks.clone() {
                Some(hooks) if hooks.send(offset, [msg1, b2, b3]) => msg1 as Real,
                _ => 0.0,
            }
        }
        Builtin::MidiRecv => {
            let Some(hooks) = vm.midi_hooks.clone() else {
                return 0.0;
            };
            let Some((offset, data)) = hooks.recv() else {
                return 0.0;
            };
            if args.is_empty() {
                return 0.0;
            }
            write_lvalue(vm, &args[0], AssignOp::Set, offset as Real);
            if args.len() >= 4 {
                write_lvalue(vm, &args[1], AssignOp::Set, data[0] as Real);
                write_lvalue(vm, &args[2], AssignOp::Set, data[1] as Real);
                write_lvalue(vm, &args[3], AssignOp::Set, data[2] as Real);
            } else if args.len() >= 3 {
                write_lvalue(vm, &args[1], AssignOp::Set, data[0] as Real);
                let packed = data[1] as i64 | ((data[2] as i64) << 8);
                write_lvalue(vm, &args[2], AssignOp::Set, packed as Real);
            }
            1.0
        }
        Builtin::MemSet => {
            let dest = arg(vm, 0);
            let value = arg(vm, 1);
            let count = arg(vm, 2).max(0.0) as u64;
            for k in 0..count {
                vm.mem.write(dest + k as f64, value);
            }
            dest
        }
        Builtin::MemCpy => {
            let dest = arg(vm, 0);
            let src = arg(vm, 1);
            let count = arg(vm, 2).max(0.0) as u64;
            for k in 0..count {
                let v = vm.mem.read(src + k as f64);
                vm.mem.write(dest + k as f64, v);
            }
            dest
        }
    }
}

/// Interpret `v` as a slider bitmask (bit n addresses slider n).
fn for_mask_bits(v: Real, mut f: impl FnMut(u32)) {
    if !v.is_finite() || v <= 0.0 {
        return;
    }
    let mask = v as u64;
    for bit in 0..64 {
        if mask & (1u64 << bit) != 0 {
            f(bit);
        }
    }
}

/// `printf`-style formatting over numeric arguments; supports the
/// `%d %i %u %x %f %g %e` conversions with an optional precision.
fn format_values(fmt: &str, values: &[Real]) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    let mut next = 0usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
                continue;
            }
            None => {
                out.push('%');
                break;
            }
            _ => {}
        }
        // optional ".N" precision
        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                p = p * 10 + d as usize;
                chars.next();
            }
            precision = Some(p);
        }
        let conv = chars.next().unwrap_or('%');
        let value = values.get(next).copied().unwrap_or(0.0);
        next += 1;
        match conv {
            'd' | 'i' => out.push_str(&format!("{}", value as i64)),
            'u' => out.push_str(&format!("{}", value.max(0.0) as u64)),
            'x' => out.push_str(&format!("{:x}", value as i64)),
            'f' => match precision {
                Some(p) => out.push_str(&format!("{:.*}", p, value)),
                None => out.push_str(&format!("{:.6}", value)),
            },
            'g' => out.push_str(&format!("{}", value)),
            'e' => out.push_str(&format!("{:e}", value)),
            other => {
                out.push('%');
                out.push(other);
                next -= 1;
            }
        }
    }
    out
}
