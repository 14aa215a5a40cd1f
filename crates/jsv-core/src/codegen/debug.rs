//! Procedure debugging and visualization utilities.

use super::instruction::{Op, OpRef, Procedure};
use std::fmt::{self, Write};

/// Dumps a procedure as indented, JavaScript-like pseudo code.
///
/// Output format:
/// ```text
/// let valid0 = undefined;
/// {
///   valid0 = customRule0(data, { schema: true });
/// }
/// if (!(valid0)) {
///   push_error("isEven", "#/isEven");
///   return false;
/// }
/// ```
pub fn dump_procedure(procedure: &Procedure) -> String {
    let mut output = String::new();
    let dumper = ProcedureDumper { procedure };
    for op_ref in procedure.body() {
        // Writing into a String never fails.
        let _ = dumper.dump_op(*op_ref, 0, &mut output);
    }
    output
}

struct ProcedureDumper<'a> {
    procedure: &'a Procedure,
}

impl ProcedureDumper<'_> {
    fn dump_op(&self, op_ref: OpRef, indent: usize, output: &mut String) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self.procedure.pool().get(op_ref) {
            Op::Declare {
                name,
                init,
                mutable,
            } => {
                let keyword = if *mutable { "let" } else { "const" };
                writeln!(output, "{pad}{keyword} {name} = {init};")
            }
            Op::Assign { name, value } => writeln!(output, "{pad}{name} = {value};"),
            Op::If {
                cond,
                then_branch,
                else_branch,
            } => {
                writeln!(output, "{pad}if ({cond}) {{")?;
                self.dump_body(then_branch, indent + 1, output)?;
                if !else_branch.is_empty() {
                    writeln!(output, "{pad}}} else {{")?;
                    self.dump_body(else_branch, indent + 1, output)?;
                }
                writeln!(output, "{pad}}}")
            }
            Op::Block(body) => {
                writeln!(output, "{pad}{{")?;
                self.dump_body(body, indent + 1, output)?;
                writeln!(output, "{pad}}}")
            }
            Op::CallRule(call) => {
                let awaited = if call.awaited { "await " } else { "" };
                let schema = call
                    .schema
                    .as_ref()
                    .map(|schema| format!("schema: {schema}, "))
                    .unwrap_or_default();
                writeln!(
                    output,
                    "{pad}{} = {awaited}{}({}, {{ {schema}parentSchema: {} }});",
                    call.valid, call.rule, call.data, call.parent_schema
                )?;
                if let Some(errors) = &call.errors {
                    writeln!(output, "{pad}{errors} = {}.errors;", call.rule)?;
                }
                Ok(())
            }
            Op::CheckSchema {
                rule, schema, valid, ..
            } => writeln!(output, "{pad}{valid} = {rule}({schema});"),
            Op::PushError(template) => writeln!(
                output,
                "{pad}push_error({:?}, {:?});",
                template.keyword.as_str(),
                template.schema_path
            ),
            Op::ConcatErrors(errors) => writeln!(output, "{pad}vErrors = vErrors.concat({errors});"),
            Op::ExtendErrors(extension) => writeln!(
                output,
                "{pad}extend_errors({}, {:?});",
                extension.since, extension.schema_path
            ),
            Op::ResetErrors(count) => writeln!(output, "{pad}reset_errors({count});"),
            Op::Return(valid) => writeln!(output, "{pad}return {valid};"),
        }
    }

    fn dump_body(&self, body: &[OpRef], indent: usize, output: &mut String) -> fmt::Result {
        body.iter()
            .try_for_each(|op_ref| self.dump_op(*op_ref, indent, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{CodeGen, Expr};

    #[test]
    fn test_dump_procedure() {
        let mut generator = CodeGen::new();
        let valid = generator.declare_let("valid", Expr::Undefined);
        generator.if_(Expr::var(&valid).not());
        generator.return_(false);
        generator.end_if();

        let dump = dump_procedure(&generator.finish());
        assert_eq!(
            dump,
            "let valid0 = undefined;\nif (!(valid0)) {\n  return false;\n}\n"
        );
    }

    #[test]
    fn test_dump_empty_procedure() {
        assert!(dump_procedure(&CodeGen::new().finish()).is_empty());
    }
}
