use super::*;
use crate::contract::abi::{ContractInterface, ContractMethod};
use crate::types::encoding::{DecodeError, Encode};
use crate::virtual_machine::assembler::assemble_source;
use crate::virtual_machine::operand::{emit_data, emit_reg, emit_type};
use crate::virtual_machine::context::ContextLoader;
use std::collections::HashMap;

/// Host with a fixed context table, one extcall and opcode counting.
#[derive(Default)]
struct TestHost {
    contexts: HashMap<String, ExecutionContext>,
    executed: Vec<Instruction>,
    natives: Vec<String>,
}

impl TestHost {
    fn with_script(mut self, name: &str, source: &str) -> Self {
        let script = assemble_source(source).unwrap().script;
        self.contexts
            .insert(name.to_string(), ExecutionContext::script(name, script));
        self
    }

    fn with_context(mut self, context: ExecutionContext) -> Self {
        self.contexts.insert(context.name().to_string(), context);
        self
    }
}

impl ContextLoader for TestHost {
    fn load_context(&mut self, name: &str) -> Option<ExecutionContext> {
        self.contexts.get(name).cloned()
    }
}

impl ExecutionHost for TestHost {
    fn validate_opcode(&mut self, _vm: &VirtualMachine, opcode: Instruction) -> Result<(), VMError> {
        self.executed.push(opcode);
        Ok(())
    }

    fn execute_interop(
        &mut self,
        vm: &mut VirtualMachine,
        method: &str,
    ) -> Result<ExecutionState, VMError> {
        match method {
            "Test.Double" => {
                vm.expect_stack(1)?;
                let n = vm.stack_pop()?.as_number()?;
                vm.stack_push(VMObject::Number(n * 2))?;
                Ok(ExecutionState::Running)
            }
            "Test.Break" => Ok(ExecutionState::Break),
            other => Err(VMError::UnknownExtcall(other.to_string())),
        }
    }

    fn execute_native(
        &mut self,
        vm: &mut VirtualMachine,
        context: &str,
    ) -> Result<ExecutionState, VMError> {
        self.natives.push(context.to_string());
        vm.stack_push(VMObject::from(format!("native:{context}")))?;
        Ok(ExecutionState::Halt)
    }
}

fn vm_for(source: &str) -> VirtualMachine {
    let script = assemble_source(source).unwrap().script;
    VirtualMachine::new(
        ExecutionContext::script("entry", script),
        &RuntimeConfig::default(),
    )
}

fn run_with(source: &str, host: &mut TestHost) -> (VirtualMachine, ExecutionState) {
    let mut vm = vm_for(source);
    let state = vm.execute(host).unwrap();
    (vm, state)
}

/// Runs to `Halt` and returns the final stack.
fn run_vm(source: &str) -> Vec<VMObject> {
    let (vm, state) = run_with(source, &mut TestHost::default());
    assert_eq!(state, ExecutionState::Halt, "fault: {:?}", vm.fault_message());
    vm.stack().to_vec()
}

fn run_top(source: &str) -> VMObject {
    run_vm(source).pop().unwrap()
}

fn run_number(source: &str) -> i64 {
    run_top(source).as_number().unwrap().try_into().unwrap()
}

/// Runs to `Fault` and returns the recorded message.
fn run_expect_fault(source: &str) -> String {
    let (vm, state) = run_with(source, &mut TestHost::default());
    assert_eq!(state, ExecutionState::Fault);
    vm.fault_message().unwrap().to_string()
}

fn run_expect_err(source: &str) -> VMError {
    let mut vm = vm_for(source);
    vm.execute(&mut TestHost::default()).unwrap_err()
}

// ==================== Scenarios ====================

#[test]
fn arithmetic_scenario_leaves_sum_on_stack() {
    let stack = run_vm("load r1, 5\nload r2, 3\nadd r1, r2, r3\npush r3\nret");
    assert_eq!(stack, vec![VMObject::from_number(8)]);
}

#[test]
fn bad_cast_scenario_message() {
    assert_eq!(
        run_expect_fault("load r1, \"abc\"\nabs r1, r2\npush r2\nret"),
        "Cannot convert String 'abc' to BigInteger."
    );
}

#[test]
fn unknown_context_scenario_message() {
    assert_eq!(
        run_expect_fault("load r1, \"ghost\"\nctx r1, r2\nswitch r2\nret"),
        "VM ctx instruction failed: could not find context with name 'ghost'"
    );
}

#[test]
fn logic_on_strings_faults() {
    assert_eq!(
        run_expect_fault("load r1, \"a\"\nload r2, true\nand r1, r2, r3"),
        "logical op unsupported for type String"
    );
    assert_eq!(
        run_expect_fault("load r1, \"a\"\nnot r1, r2"),
        "logical op unsupported for type String"
    );
}

#[test]
fn comparison_on_non_numeric_string_names_value() {
    assert_eq!(
        run_expect_fault("load r1, \"x1\"\nload r2, 3\nlt r1, r2, r3"),
        "Cannot convert String 'x1' to BigInteger."
    );
}

#[test]
fn execution_is_deterministic() {
    let source = "load r1, 7\nload r2, 6\nmul r1, r2, r3\npush r3\nload r4, \"x\"\npush r4\nret";
    let (a, b) = (run_vm(source), run_vm(source));
    assert_eq!(a, b);
}

// ==================== Registers and stack ====================

#[test]
fn move_leaves_source_empty() {
    let stack = run_vm("load r1, 4\nmove r1, r2\npush r1\npush r2\nret");
    assert_eq!(stack, vec![VMObject::None, VMObject::from_number(4)]);
}

#[test]
fn copy_keeps_source() {
    let stack = run_vm("load r1, 4\ncopy r1, r2\npush r1\npush r2\nret");
    assert_eq!(stack, vec![VMObject::from_number(4), VMObject::from_number(4)]);
}

#[test]
fn swap_registers() {
    let stack = run_vm("load r1, 1\nload r2, 2\nswap r1, r2\npush r1\nret");
    assert_eq!(stack, vec![VMObject::from_number(2)]);
}

#[test]
fn pop_from_empty_stack_aborts() {
    assert!(matches!(run_expect_err("pop r1"), VMError::StackUnderflow));
}

#[test]
fn register_out_of_bounds_aborts() {
    let script = assemble_source("load r200, 1").unwrap().script;
    let config = RuntimeConfig::default().with_register_count(8);
    let mut vm = VirtualMachine::new(ExecutionContext::script("entry", script), &config);
    assert!(matches!(
        vm.execute(&mut TestHost::default()),
        Err(VMError::InvalidRegisterIndex { index: 200, .. })
    ));
}

#[test]
fn stack_limit_is_enforced() {
    let script = assemble_source("load r1, 1\npush r1\npush r1\npush r1").unwrap().script;
    let config = RuntimeConfig::default().with_max_stack_size(2);
    let mut vm = VirtualMachine::new(ExecutionContext::script("entry", script), &config);
    assert!(matches!(
        vm.execute(&mut TestHost::default()),
        Err(VMError::StackOverflow { limit: 2 })
    ));
}

#[test]
fn arguments_pushed_before_execute_reach_entry() {
    let mut vm = vm_for("pop r1\ninc r1\npush r1\nret");
    vm.stack_push(VMObject::from_number(41)).unwrap();
    assert_eq!(vm.execute(&mut TestHost::default()).unwrap(), ExecutionState::Halt);
    assert_eq!(vm.stack_pop().unwrap(), VMObject::from_number(42));
}

// ==================== Control flow ====================

#[test]
fn conditional_loop() {
    let source = "
        load r1, 0
        load r2, 5
    loop:
        inc r1
        lt r1, r2, r3
        jmpif r3, loop
        push r1
        ret
    ";
    assert_eq!(run_number(source), 5);
}

#[test]
fn jmpnot_skips_on_false() {
    let source = "
        load r1, false
        load r2, 1
        jmpnot r1, done
        load r2, 2
    done:
        push r2
        ret
    ";
    assert_eq!(run_number(source), 1);
}

#[test]
fn call_and_ret() {
    let source = "
        load r1, 10
        call double
        push r1
        ret
    double:
        add r1, r1, r1
        ret
    ";
    assert_eq!(run_number(source), 20);
}

#[test]
fn falling_off_the_end_halts() {
    assert_eq!(run_vm("load r1, 1\npush r1"), vec![VMObject::from_number(1)]);
}

#[test]
fn jump_past_end_aborts() {
    let err = run_expect_err("jmp 900");
    assert!(matches!(err, VMError::InvalidIP { ip: 900 }));
}

#[test]
fn invalid_opcode_aborts() {
    let mut vm = VirtualMachine::new(
        ExecutionContext::script("entry", vec![Instruction::Nop as u8, 0xEE]),
        &RuntimeConfig::default(),
    );
    assert!(matches!(
        vm.execute(&mut TestHost::default()),
        Err(VMError::InvalidOpcode {
            opcode: 0xEE,
            offset: 1
        })
    ));
}

#[test]
fn throw_aborts_with_message() {
    let err = run_expect_err("load r1, \"boom\"\nthrow r1");
    assert_eq!(err.to_string(), "boom");
    assert!(!err.is_fault());
}

#[test]
fn extcall_reaches_host() {
    let source = "load r1, 21\npush r1\nload r2, \"Test.Double\"\nextcall r2\nret";
    assert_eq!(run_number(source), 42);
}

#[test]
fn extcall_break_stops_execution() {
    let mut host = TestHost::default();
    let (_, state) = run_with("load r1, \"Test.Break\"\nextcall r1\nnop\nret", &mut host);
    assert_eq!(state, ExecutionState::Break);
    assert_eq!(host.executed.last(), Some(&Instruction::Extcall));
}

#[test]
fn unknown_extcall_aborts() {
    let err = run_expect_err("load r1, \"Nope.Nothing\"\nextcall r1");
    assert!(matches!(err, VMError::UnknownExtcall(name) if name == "Nope.Nothing"));
}

// ==================== Values ====================

#[test]
fn load_literal_types() {
    assert_eq!(run_top("load r1, true\npush r1"), VMObject::Bool(true));
    assert_eq!(run_top("load r1, 0x0aff\npush r1"), VMObject::Bytes(vec![0x0a, 0xff]));
    assert_eq!(run_top("load r1, Timestamp:9\npush r1"), VMObject::Timestamp(9));
    assert_eq!(run_top("load r1, -12\npush r1"), VMObject::from_number(-12));
}

#[test]
fn cast_string_to_number() {
    assert_eq!(run_number("load r1, \"-17\"\ncast r1, r2, Number\npush r2"), -17);
    assert_eq!(
        run_top("load r1, 1\ncast r1, r2, Bool\npush r2"),
        VMObject::Bool(true)
    );
}

#[test]
fn cat_strings_and_bytes() {
    assert_eq!(
        run_top("load r1, \"ab\"\nload r2, \"cd\"\ncat r1, r2, r3\npush r3"),
        VMObject::from("abcd")
    );
    assert_eq!(
        run_top("load r1, 0x01\nload r2, 0x02\ncat r1, r2, r3\npush r3"),
        VMObject::Bytes(vec![1, 2])
    );
    assert_eq!(
        run_top("load r1, \"x\"\ncat r1, r9, r3\npush r3"),
        VMObject::from("x")
    );
}

#[test]
fn left_right_keep_type() {
    assert_eq!(
        run_top("load r1, \"hello\"\nleft r1, r2, 2\npush r2"),
        VMObject::from("he")
    );
    assert_eq!(
        run_top("load r1, 0x010203\nright r1, r2, 2\npush r2"),
        VMObject::Bytes(vec![2, 3])
    );
    assert!(run_expect_fault("load r1, \"hi\"\nleft r1, r2, 3").contains("out of range"));
    assert!(run_expect_fault("load r1, 5\nleft r1, r2, 1").contains("LEFT unsupported"));
}

#[test]
fn range_slices_bytes() {
    assert_eq!(
        run_top("load r1, \"hello\"\nrange r1, r2, 1, 3\npush r2"),
        VMObject::Bytes(b"ell".to_vec())
    );
    assert!(run_expect_fault("load r1, \"hi\"\nrange r1, r2, 1, 5").starts_with("invalid range"));
}

#[test]
fn substr_respects_code_points() {
    assert_eq!(
        run_top("load r1, \"hello\"\nsubstr r1, r2, 1, 3\npush r2"),
        VMObject::from("ell")
    );
    assert!(
        run_expect_fault("load r1, \"h\u{e9}llo\"\nsubstr r1, r2, 0, 2").starts_with("invalid range")
    );
}

#[test]
fn size_and_count() {
    assert_eq!(run_number("load r1, \"h\u{e9}\"\nsize r1, r2\npush r2"), 3);
    let source = "
        load r1, 1
        push r1
        push r1
        push r1
        pack r2, 3
        count r2, r3
        push r3
    ";
    assert_eq!(run_number(source), 3);
}

// ==================== Logic and comparison ====================

#[test]
fn boolean_logic() {
    assert_eq!(
        run_top("load r1, true\nload r2, false\nor r1, r2, r3\npush r3"),
        VMObject::Bool(true)
    );
    assert_eq!(
        run_top("load r1, true\nload r2, true\nxor r1, r2, r3\npush r3"),
        VMObject::Bool(false)
    );
    assert_eq!(run_top("load r1, false\nnot r1, r2\npush r2"), VMObject::Bool(true));
}

#[test]
fn bitwise_on_numbers() {
    assert_eq!(run_number("load r1, 12\nload r2, 10\nand r1, r2, r3\npush r3"), 8);
    assert_eq!(run_number("load r1, 12\nload r2, 10\nxor r1, r2, r3\npush r3"), 6);
}

#[test]
fn equality_across_types() {
    assert_eq!(
        run_top("load r1, \"5\"\nload r2, 5\nequal r1, r2, r3\npush r3"),
        VMObject::Bool(false)
    );
    assert_eq!(
        run_top("load r1, \"a\"\nload r2, \"a\"\nequal r1, r2, r3\npush r3"),
        VMObject::Bool(true)
    );
}

#[test]
fn ordering_comparisons() {
    let cmp = |op: &str| run_top(&format!("load r1, 3\nload r2, 3\n{op} r1, r2, r3\npush r3"));
    assert_eq!(cmp("lt"), VMObject::Bool(false));
    assert_eq!(cmp("lte"), VMObject::Bool(true));
    assert_eq!(cmp("gt"), VMObject::Bool(false));
    assert_eq!(cmp("gte"), VMObject::Bool(true));
}

// ==================== Arithmetic ====================

#[test]
fn binary_arithmetic() {
    let calc = |op: &str, a: i64, b: i64| {
        run_number(&format!("load r1, {a}\nload r2, {b}\n{op} r1, r2, r3\npush r3"))
    };
    assert_eq!(calc("sub", 3, 5), -2);
    assert_eq!(calc("mul", -4, 5), -20);
    assert_eq!(calc("div", -7, 2), -3);
    assert_eq!(calc("mod", -7, 2), -1);
    assert_eq!(calc("shl", 3, 4), 48);
    assert_eq!(calc("shr", 48, 4), 3);
    assert_eq!(calc("min", 3, -1), -1);
    assert_eq!(calc("max", 3, -1), 3);
    assert_eq!(calc("pow", 2, 10), 1024);
}

#[test]
fn numbers_are_arbitrary_precision() {
    let top = run_top("load r1, 2\nload r2, 200\npow r1, r2, r3\npush r3");
    assert_eq!(top.as_number().unwrap(), BigInt::from(2).pow(200u32));
}

#[test]
fn unary_arithmetic() {
    assert_eq!(run_number("load r1, 5\ninc r1\npush r1"), 6);
    assert_eq!(run_number("load r1, 5\ndec r1\npush r1"), 4);
    assert_eq!(run_number("load r1, -5\nsign r1, r2\npush r2"), -1);
    assert_eq!(run_number("load r1, 5\nnegate r1, r2\npush r2"), -5);
    assert_eq!(run_number("load r1, -5\nabs r1, r2\npush r2"), 5);
}

#[test]
fn numeric_strings_are_accepted() {
    assert_eq!(run_number("load r1, \"40\"\nload r2, 2\nadd r1, r2, r3\npush r3"), 42);
}

#[test]
fn division_by_zero_faults() {
    assert_eq!(
        run_expect_fault("load r1, 1\nload r2, 0\ndiv r1, r2, r3"),
        "division by zero"
    );
    assert_eq!(
        run_expect_fault("load r1, 1\nload r2, 0\nmod r1, r2, r3"),
        "division by zero"
    );
}

#[test]
fn negative_shift_faults() {
    assert!(run_expect_fault("load r1, 1\nload r2, -1\nshl r1, r2, r3").starts_with("invalid range"));
}

#[test]
fn shifts_are_bounded() {
    assert_eq!(
        run_expect_fault("load r1, 1\nload r2, 2147483648\nshl r1, r2, r3"),
        "invalid range: shift by 2147483648"
    );
    let top = run_top("load r1, 1\nload r2, 4095\nshl r1, r2, r3\npush r3");
    assert_eq!(top.as_number().unwrap().bits(), MAX_INTEGER_BITS);
    assert_eq!(
        run_expect_fault("load r1, 1\nload r2, 4096\nshl r1, r2, r3"),
        "SHL result exceeds 4096 bits"
    );
    assert_eq!(run_number("load r1, 0\nload r2, 4096\nshl r1, r2, r3\npush r3"), 0);
}

#[test]
fn pow_result_is_bounded() {
    assert_eq!(
        run_expect_fault("load r1, 2\nload r2, 5000\npow r1, r2, r3"),
        "POW result exceeds 4096 bits"
    );
    assert_eq!(
        run_expect_fault("load r1, 3\nload r2, 2600\npow r1, r2, r3"),
        "POW result exceeds 4096 bits"
    );
    assert_eq!(run_number("load r1, 1\nload r2, 4000000000\npow r1, r2, r3\npush r3"), 1);
    assert_eq!(run_number("load r1, -1\nload r2, 4000000001\npow r1, r2, r3\npush r3"), -1);
}

#[test]
fn repeated_squaring_faults() {
    assert_eq!(
        run_expect_fault("load r1, 3\nloop: mul r1, r1, r1\njmp loop"),
        "MUL result exceeds 4096 bits"
    );
}

// ==================== Structs ====================

#[test]
fn put_get_and_clear() {
    let source = "
        load r1, 9
        load r2, \"k\"
        put r1, r3, r2
        get r3, r4, r2
        push r4
        clear r3
        push r3
    ";
    assert_eq!(run_vm(source), vec![VMObject::from_number(9), VMObject::None]);
}

#[test]
fn put_on_scalar_faults() {
    assert_eq!(
        run_expect_fault("load r1, 1\nload r2, \"k\"\nload r3, 5\nput r1, r3, r2"),
        "PUT unsupported for type Number"
    );
}

#[test]
fn pack_and_unpack_preserve_order() {
    let source = "
        load r1, \"a\"
        load r2, \"b\"
        push r2
        push r1
        pack r3, 2
        unpack r3
    ";
    assert_eq!(run_vm(source), vec![VMObject::from("b"), VMObject::from("a")]);
}

#[test]
fn pack_needs_enough_values() {
    assert!(matches!(
        run_expect_err("load r1, 1\npush r1\npack r2, 2"),
        VMError::NotEnoughArguments {
            expected: 2,
            actual: 1
        }
    ));
}

/// `levels` structs each holding the next under key 0, innermost `None`.
fn nested_struct_bytes(levels: usize) -> Vec<u8> {
    let mut level = vec![VMType::Struct as u8];
    level.extend_from_slice(&1u64.to_le_bytes());
    level.extend(VMObject::from_number(0).to_bytes());
    let mut bytes = level.repeat(levels);
    bytes.push(VMType::None as u8);
    bytes
}

fn load_struct_script(payload: &[u8]) -> VirtualMachine {
    let mut script = vec![Instruction::Load as u8];
    emit_reg(&mut script, 1);
    emit_type(&mut script, VMType::Struct);
    emit_data(&mut script, payload);
    script.push(Instruction::Push as u8);
    emit_reg(&mut script, 1);
    script.push(Instruction::Ret as u8);
    VirtualMachine::new(
        ExecutionContext::script("entry", script),
        &RuntimeConfig::default(),
    )
}

#[test]
fn deeply_nested_struct_load_faults() {
    let mut vm = load_struct_script(&nested_struct_bytes(20_000));
    let state = vm.execute(&mut TestHost::default()).unwrap();
    assert_eq!(state, ExecutionState::Fault);
    assert_eq!(vm.fault_message(), Some("struct nesting exceeds 64 levels"));
}

#[test]
fn struct_load_at_nesting_limit() {
    let mut vm = load_struct_script(&nested_struct_bytes(MAX_NESTING));
    assert_eq!(vm.execute(&mut TestHost::default()).unwrap(), ExecutionState::Halt);
    assert_eq!(vm.stack()[0].depth(), MAX_NESTING);

    let mut vm = load_struct_script(&nested_struct_bytes(MAX_NESTING + 1));
    assert_eq!(vm.execute(&mut TestHost::default()).unwrap(), ExecutionState::Fault);
}

#[test]
fn malformed_struct_load_aborts() {
    let mut truncated = nested_struct_bytes(3);
    truncated.pop();
    let mut vm = load_struct_script(&truncated);
    assert!(matches!(
        vm.execute(&mut TestHost::default()),
        Err(VMError::Decode(DecodeError::UnexpectedEof))
    ));

    let mut oversized = vec![VMType::Struct as u8];
    oversized.extend_from_slice(&u64::MAX.to_le_bytes());
    let mut vm = load_struct_script(&oversized);
    assert!(matches!(
        vm.execute(&mut TestHost::default()),
        Err(VMError::Decode(DecodeError::LengthOverflow))
    ));
}

#[test]
fn self_put_nesting_is_bounded() {
    let source = "load r2, \"k\"\nloop: put r1, r1, r2\njmp loop";
    assert_eq!(run_expect_fault(source), "struct nesting exceeds 64 levels");
}

#[test]
fn repeated_pack_nesting_is_bounded() {
    let source = "load r1, 1\nloop: push r1\npack r1, 1\njmp loop";
    assert_eq!(run_expect_fault(source), "struct nesting exceeds 64 levels");
}

// ==================== Contexts ====================

#[test]
fn switch_hands_stack_over_and_back() {
    let mut host = TestHost::default().with_script("inc", "pop r1\ninc r1\npush r1\nret");
    let source = "load r1, 1\npush r1\nload r2, \"inc\"\nctx r2, r3\nswitch r3\nret";
    let (vm, state) = run_with(source, &mut host);
    assert_eq!(state, ExecutionState::Halt);
    assert_eq!(vm.stack(), &[VMObject::from_number(2)]);
    assert_eq!(vm.depth(), 0);
}

#[test]
fn nested_fault_aborts_caller() {
    let mut host = TestHost::default().with_script("bad", "load r1, \"abc\"\nabs r1, r2");
    let mut vm = vm_for("load r1, \"bad\"\nctx r1, r2\nswitch r2\nret");
    let err = vm.execute(&mut host).unwrap_err();
    assert!(matches!(&err, VMError::NestedFault { context, .. } if context == "bad"));
    assert_eq!(err.to_string(), "Cannot convert String 'abc' to BigInteger.");
}

#[test]
fn nested_break_is_a_failed_switch() {
    let mut host =
        TestHost::default().with_script("stop", "load r1, \"Test.Break\"\nextcall r1");
    let mut vm = vm_for("load r1, \"stop\"\nctx r1, r2\nswitch r2\nret");
    assert!(matches!(
        vm.execute(&mut host),
        Err(VMError::ContextSwitchFailed { state: "Break", .. })
    ));
}

#[test]
fn native_and_dummy_contexts() {
    let mut host = TestHost::default()
        .with_context(ExecutionContext::native("stake"))
        .with_context(ExecutionContext::dummy("gas"));
    let source = "
        load r1, \"stake\"
        ctx r1, r2
        switch r2
        load r1, \"gas\"
        ctx r1, r2
        switch r2
        ret
    ";
    let (vm, state) = run_with(source, &mut host);
    assert_eq!(state, ExecutionState::Halt);
    assert_eq!(host.natives, vec!["stake".to_string()]);
    assert_eq!(vm.stack(), &[VMObject::from("native:stake")]);
}

#[test]
fn abi_method_name_selects_entry_point() {
    let source = "
        load r1, 1
        push r1
        ret
    pub second:
        load r1, 2
        push r1
        ret
    ";
    let assembled = assemble_source(source).unwrap();
    let methods = assembled
        .entry_points
        .iter()
        .map(|(name, ofs)| ContractMethod::new(name.clone(), VMType::Number, vec![], *ofs as i32))
        .collect();
    let abi = ContractInterface::new(methods, vec![]).unwrap();
    let mut host = TestHost::default().with_context(ExecutionContext::script_with_abi(
        "token",
        assembled.script,
        abi,
    ));

    let caller = "load r1, \"second\"\npush r1\nload r2, \"token\"\nctx r2, r3\nswitch r3\nret";
    let (vm, _) = run_with(caller, &mut host);
    assert_eq!(vm.stack(), &[VMObject::from_number(2)]);
}

// ==================== Host hooks ====================

#[test]
fn every_opcode_is_validated_in_order() {
    let mut host = TestHost::default();
    run_with("load r1, 5\nload r2, 3\nadd r1, r2, r3\npush r3\nret", &mut host);
    assert_eq!(
        host.executed,
        vec![
            Instruction::Load,
            Instruction::Load,
            Instruction::Add,
            Instruction::Push,
            Instruction::Ret
        ]
    );
}

#[test]
fn entry_context_tracking() {
    let vm = vm_for("ret");
    assert!(vm.is_entry_context());
    assert!(vm.current_context().is_none());
    assert_eq!(vm.entry_context().name(), "entry");
}
