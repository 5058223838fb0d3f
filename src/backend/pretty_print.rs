use colored::Colorize;
use itertools::Itertools;

use super::{
    ValueType,
    lir::{self, Immediate, Instruction, Operand},
};
use crate::{index::Index, middle::primitive::IntKind};

pub fn pretty_print_lir(module: &lir::Module) {
    print!("{module}");
}

fn int_name(kind: IntKind) -> &'static str {
    match kind {
        IntKind::I8 => "i8",
        IntKind::I16 => "i16",
        IntKind::I32 => "i32",
        IntKind::I64 => "i64",
        IntKind::U8 => "u8",
        IntKind::U16 => "u16",
        IntKind::U32 => "u32",
        IntKind::U64 => "u64",
    }
}

fn register(id: lir::RegisterId) -> String {
    format!("%{}", id.index()).yellow().to_string()
}

fn label(function: &lir::FunctionDefinition, id: lir::BlockId) -> String {
    let name = function
        .blocks
        .get(id)
        .map(|block| block.name.as_str())
        .unwrap_or("label");

    format!(".{name}_{}", id.index())
}

fn type_name(module: &lir::Module, ty: lir::Type) -> String {
    match ty {
        ValueType::Void => "void".to_owned(),
        ValueType::Bool => "bool".to_owned(),
        ValueType::Int(kind) => int_name(kind).to_owned(),
        ValueType::Pointer => "ptr".to_owned(),
        ValueType::Struct(id) => module
            .structs
            .get(id)
            .map(|definition| definition.name.clone())
            .unwrap_or_else(|| format!("struct_{}", id.index())),
    }
}

impl core::fmt::Display for Immediate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Immediate::Int(value, _) => write!(f, "{value}"),
            Immediate::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl core::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Immediate(immediate) => write!(f, "{}", immediate.to_string().purple()),
            Operand::Register(id) => write!(f, "{}", register(*id)),
        }
    }
}

fn write_instruction(
    f: &mut std::fmt::Formatter<'_>,
    module: &lir::Module,
    function: &lir::FunctionDefinition,
    instruction: &Instruction,
) -> std::fmt::Result {
    match instruction {
        Instruction::AllocStack { destination, ty } => write!(
            f,
            "{} {} {} {}",
            register(*destination),
            "=".white(),
            "alloc".cyan(),
            type_name(module, *ty)
        ),
        Instruction::LoadMem {
            destination,
            ty,
            source,
        } => write!(
            f,
            "{} {} {} {} {source}",
            register(*destination),
            "=".white(),
            "load".cyan(),
            type_name(module, *ty)
        ),
        Instruction::StoreMem {
            destination,
            source,
        } => write!(f, "{} {destination} {} {source}", "store".cyan(), "<-".white()),
        Instruction::GetStructElementPointer {
            destination,
            source,
            ty,
            index,
        } => write!(
            f,
            "{} {} {} {source}, {}, {}",
            register(*destination),
            "=".white(),
            "get_struct_element_ptr".cyan(),
            type_name(module, ValueType::Struct(*ty)),
            index.to_string().purple()
        ),
        Instruction::IntegerCast {
            kind,
            destination,
            operand,
        } => write!(
            f,
            "{} {} {} {operand} {} {}",
            register(*destination),
            "=".white(),
            "cast".cyan(),
            "to".white(),
            int_name(*kind)
        ),
        Instruction::UnaryOperation {
            operator,
            destination,
            operand,
        } => write!(
            f,
            "{} {} {}{operand}",
            register(*destination),
            "=".white(),
            operator.to_string().white()
        ),
        Instruction::BinaryOperation {
            operator,
            destination,
            lhs,
            rhs,
        } => write!(
            f,
            "{} {} {lhs} {} {rhs}",
            register(*destination),
            "=".white(),
            operator.to_string().white()
        ),
        Instruction::Branch {
            condition,
            positive,
            negative,
        } => write!(
            f,
            "{} {condition} {} {}",
            "br".cyan(),
            label(function, *positive).blue(),
            label(function, *negative).blue()
        ),
        Instruction::Jump { destination } => {
            write!(f, "{} {}", "jmp".cyan(), label(function, *destination).blue())
        }
        Instruction::Return { value: Some(value) } => write!(f, "{} {value}", "ret".cyan()),
        Instruction::Return { value: None } => write!(f, "{}", "ret".cyan()),
        Instruction::FunctionCall {
            target,
            arguments,
            destination,
        } => {
            if let Some(destination) = destination {
                write!(f, "{} {} ", register(*destination), "=".white())?;
            }

            let name = module
                .functions
                .get(*target)
                .map(|callee| callee.symbol_name.as_str())
                .unwrap_or("?");

            write!(
                f,
                "{} {}({})",
                "call".cyan(),
                name.blue(),
                arguments.iter().map(|op| op.to_string()).join(", ")
            )
        }
    }
}

impl core::fmt::Display for lir::Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for definition in self.structs.iter() {
            let fields = definition
                .fields
                .iter()
                .flatten()
                .map(|ty| type_name(self, *ty))
                .join(", ");

            writeln!(f, "{} {} {{ {fields} }}", "struct".magenta(), definition.name.blue())?;
        }

        for function in self.functions.iter() {
            if !self.structs.is_empty() || function.id.index() != 0 {
                writeln!(f)?;
            }

            let mut parameters = function
                .arguments
                .iter()
                .map(|argument| {
                    format!(
                        "{}: {}",
                        register(*argument),
                        type_name(self, function.registers[*argument].ty)
                    )
                })
                .collect::<Vec<_>>();
            if function.is_variadic {
                parameters.push("...".to_owned());
            }

            if function.is_external {
                write!(f, "{} ", "extern".magenta())?;
            }

            write!(
                f,
                "{} {}{}{}{} {}",
                "fn".magenta(),
                function.symbol_name.blue(),
                "(".white(),
                parameters.join(", "),
                ")".white(),
                format!("-> {}", type_name(self, function.return_type)).white()
            )?;

            if function.is_external {
                writeln!(f)?;
                continue;
            }

            writeln!(f, " {}", "{".white())?;

            for block in function.blocks.iter() {
                writeln!(f, "{}", format!("{}:", label(function, block.id)).bright_red())?;

                for instruction in &block.instructions {
                    write!(f, "    ")?;
                    write_instruction(f, self, function, instruction)?;
                    writeln!(f)?;
                }
            }

            writeln!(f, "{}", "}".white())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::backend::{
        Builder, FunctionSignature,
        lir::{LirBuilder, Type},
    };
    use crate::middle::primitive::IntKind;

    #[test]
    fn prints_structs_functions_and_blocks() {
        let mut builder = LirBuilder::new();
        let point = builder.declare_struct("Point");
        builder
            .define_struct(point, vec![Type::Int(IntKind::I64), Type::Bool])
            .unwrap();

        builder.declare_function(FunctionSignature {
            name: "puts".to_owned(),
            parameters: vec![Type::Pointer],
            return_type: Type::Int(IntKind::I32),
            is_variadic: true,
            is_external: true,
        });
        let function = builder.declare_function(FunctionSignature {
            name: "Point.get".to_owned(),
            parameters: vec![Type::Pointer],
            return_type: Type::Int(IntKind::I64),
            is_variadic: false,
            is_external: false,
        });

        builder.begin_function(function).unwrap();
        let this = builder.parameter(function, 0).unwrap();
        let slot = builder.alloca(Type::Int(IntKind::I64)).unwrap();
        let field = builder.field_pointer(point, this, 0).unwrap();
        let value = builder.load(Type::Int(IntKind::I64), field).unwrap();
        builder.store(value, slot).unwrap();
        let end = builder.create_block("function_end").unwrap();
        builder.branch(end).unwrap();
        builder.set_insertion_point(end).unwrap();
        let result = builder.load(Type::Int(IntKind::I64), slot).unwrap();
        builder.ret(Some(result)).unwrap();
        builder.end_function().unwrap();

        let printed = strip_ansi_escapes::strip_str(builder.module().to_string());
        assert_eq!(
            printed,
            indoc! {"
                struct Point { i64, bool }

                extern fn puts(%0: ptr, ...) -> i32

                fn Point.get(%0: ptr) -> i64 {
                .entry_0:
                    %1 = alloc i64
                    %2 = get_struct_element_ptr %0, Point, 0
                    %3 = load i64 %2
                    store %1 <- %3
                    jmp .function_end_1
                .function_end_1:
                    %4 = load i64 %1
                    ret %4
                }
            "}
        );
    }
}
