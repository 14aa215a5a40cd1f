use super::KeywordCxt;
use crate::codegen::{Expr, Name, Op, RuleCall, names::ERRORS};
use crate::compile::errors::{extend_errors, report_error};
use crate::compile::registry::{CustomRule, RuleRef};
use crate::definition::{ErrorDescriptor, ErrorsMode, KeywordDefinition, KeywordKind, RuleFn};
use crate::error::CompileError;
use serde_json::Value;

/// Emits the call of an external rule and the handling of its outcome.
pub(super) fn func_keyword_code(
    cxt: &mut KeywordCxt<'_, '_>,
    def: &KeywordDefinition,
) -> Result<(), CompileError> {
    let rule = match &def.kind {
        KeywordKind::Compile { compile, .. } if !cxt.is_data() => {
            compile(cxt.schema(), cxt.parent_schema(), cxt.host())
        }
        kind => kind.validate_fn().cloned(),
    };
    let awaited = rule.as_ref().is_some_and(RuleFn::is_async);
    if awaited && !cxt.session.is_async() {
        return Err(CompileError::AsyncKeywordInSyncSchema {
            keyword: cxt.keyword().into(),
        });
    }
    let rule = cxt.session.rules.add(cxt.keyword(), rule)?;
    let valid = cxt.code().declare_let("valid", Expr::Undefined);

    let call = FuncRule {
        def,
        rule,
        valid,
        awaited,
    };
    match def.errors {
        ErrorsMode::None => call.validate_no_errors_rule(cxt),
        ErrorsMode::Detailed => call.validate_rule_with_errors(cxt),
    }
}

struct FuncRule<'d> {
    def: &'d KeywordDefinition,
    rule: RuleRef,
    valid: Name,
    awaited: bool,
}

impl FuncRule<'_> {
    fn validate_no_errors_rule(&self, cxt: &mut KeywordCxt<'_, '_>) -> Result<(), CompileError> {
        cxt.code().open_block();
        if cxt.is_data() {
            self.check_data(cxt);
        }
        self.assign_valid(cxt, None);
        if self.def.modifying {
            modify_data(cxt);
        }
        cxt.code().close_block();

        if self.def.valid != Some(true) {
            cxt.fail(Expr::var(&self.valid).not())?;
        }
        Ok(())
    }

    fn validate_rule_with_errors(&self, cxt: &mut KeywordCxt<'_, '_>) -> Result<(), CompileError> {
        cxt.code().open_block();
        if cxt.is_data() {
            self.check_data(cxt);
        }
        let errs_count = cxt.code().declare_const("_errs", Expr::var(&ERRORS));
        let rule_errs = cxt.code().declare_let("ruleErrs", Expr::Lit(Value::Null));
        self.assign_valid(cxt, Some(rule_errs.clone()));
        if self.def.modifying {
            modify_data(cxt);
        }
        cxt.code().close_block();

        match self.def.valid {
            Some(true) => {}
            Some(false) => {
                add_keyword_errors(cxt, &rule_errs, &errs_count)?;
                cxt.ok(Expr::lit(false))?;
            }
            None => {
                cxt.fail_with(Some(Expr::var(&self.valid).not()), |cxt| {
                    add_keyword_errors(cxt, &rule_errs, &errs_count)
                })?;
            }
        }
        Ok(())
    }

    /// An absent computed value is valid; a present one must pass the keyword's own
    /// schema validator before the rule runs. Both conditionals stay open until the
    /// enclosing block closes.
    fn check_data(&self, cxt: &mut KeywordCxt<'_, '_>) {
        let schema_code = cxt.schema_code().clone();
        let code = cxt.code();
        code.if_(schema_code.clone().is_undefined());
        code.assign(&self.valid, Expr::lit(true));
        code.else_();

        if let Some(validator) = &self.def.schema_validator {
            let rule = cxt
                .session
                .rules
                .push(CustomRule::SchemaCheck(validator.clone()));
            let keyword = cxt.keyword().into();
            let code = cxt.code();
            code.emit(Op::CheckSchema {
                keyword,
                rule,
                schema: schema_code,
                valid: self.valid.clone(),
            });
            code.if_(Expr::var(&self.valid));
        }
    }

    fn assign_valid(&self, cxt: &mut KeywordCxt<'_, '_>, errors: Option<Name>) {
        let compiled = matches!(self.def.kind, KeywordKind::Compile { .. }) && !cxt.is_data();
        let pass_schema = !(compiled || !self.def.pass_schema);
        let it = cxt.it();

        let call = RuleCall {
            keyword: cxt.keyword().into(),
            rule: self.rule,
            valid: self.valid.clone(),
            errors,
            awaited: self.awaited,
            data: it.data.clone(),
            parent_data: it.parent_data.clone(),
            parent_data_property: it.parent_data_property.clone(),
            schema: pass_schema.then(|| cxt.schema_code().clone()),
            parent_schema: Expr::Schema {
                top: it.top_schema_ref,
                pointer: it.schema_path.clone(),
            },
            pass_context: cxt.session.options().pass_context,
        };
        cxt.code().emit(Op::CallRule(call));
    }
}

/// Rebinds the data to its slot in the parent, where a modifying rule wrote its result.
fn modify_data(cxt: &mut KeywordCxt<'_, '_>) {
    let it = cxt.it();
    let (data, parent_data) = (it.data.clone(), it.parent_data.clone());
    let slot = Expr::var(&parent_data).member(it.parent_data_property.clone());

    let code = cxt.code();
    code.if_(Expr::var(&parent_data));
    code.assign(&data, slot);
    code.end_if();
}

/// Appends the rule's own error list, or the generic keyword error if it gave none.
fn add_keyword_errors(
    cxt: &mut KeywordCxt<'_, '_>,
    rule_errs: &Name,
    errs_count: &Name,
) -> Result<(), CompileError> {
    cxt.code().if_(Expr::IsErrorList(Box::new(Expr::var(rule_errs))));
    cxt.code().emit(Op::ConcatErrors(rule_errs.clone()));
    extend_errors(cxt, errs_count);
    cxt.code().else_();
    report_error(cxt, &ErrorDescriptor::keyword_error());
    cxt.code().end_if();
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::definition::{AsyncOutcome, ErrorsMode, KeywordDefinition, RuleFn};
    use crate::error::CompileError;
    use crate::options::Options;
    use crate::validator::Validator;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("idExists")]
    #[case("unique")]
    fn test_async_keyword_in_sync_schema(#[case] keyword: &str) {
        let mut host = Validator::new(Options::default());
        host.add_keyword(
            keyword,
            KeywordDefinition::validate_async(|_, _| Box::pin(async { AsyncOutcome::Ok(true) })),
        )
        .unwrap();

        let result = host.compile(&json!({ keyword: true }));
        assert!(matches!(
            result,
            Err(CompileError::AsyncKeywordInSyncSchema { keyword: k }) if k.as_str() == keyword
        ));
    }

    #[test]
    fn test_compiled_async_rule_in_sync_schema() {
        let mut host = Validator::new(Options::default());
        host.add_keyword(
            "lookup",
            KeywordDefinition::compile(|_, _, _| {
                Some(RuleFn::asynchronous(|_, _| {
                    Box::pin(async { AsyncOutcome::Ok(true) })
                }))
            }),
        )
        .unwrap();

        assert!(matches!(
            host.compile(&json!({"lookup": true})),
            Err(CompileError::AsyncKeywordInSyncSchema { .. })
        ));
    }

    #[test]
    fn test_compile_yielding_nothing_fails() {
        let mut host = Validator::new(Options::default());
        host.add_keyword("even", KeywordDefinition::compile(|_, _, _| None))
            .unwrap();

        assert_eq!(
            host.compile(&json!({"even": true})).map(|_| ()),
            Err(CompileError::KeywordCompileFailed("even".into()))
        );
    }

    #[test]
    fn test_compiled_rule_does_not_receive_schema() {
        let mut host = Validator::new(Options::default());
        host.add_keyword(
            "even",
            KeywordDefinition::compile(|schema, _, _| {
                let expected = schema.as_bool()?;
                Some(RuleFn::sync(move |data, args| {
                    assert!(args.schema.is_none());
                    (data.as_i64().is_some_and(|n| n % 2 == 0) == expected).into()
                }))
            })
            .with_errors(ErrorsMode::None),
        )
        .unwrap();

        let compiled = host.compile(&json!({"even": true})).unwrap();
        assert!(compiled.validate(&mut json!(2)).unwrap().valid);
        assert!(!compiled.validate(&mut json!(3)).unwrap().valid);
    }

    #[test]
    fn test_no_errors_rule_with_known_valid_outcome_never_fails() {
        let mut host = Validator::new(Options::default());
        host.add_keyword(
            "note",
            KeywordDefinition::validate(|_, _| false.into())
                .with_errors(ErrorsMode::None)
                .with_valid(true),
        )
        .unwrap();

        let compiled = host.compile(&json!({"note": "anything"})).unwrap();
        let validation = compiled.validate(&mut json!(1)).unwrap();
        assert!(validation.valid);
        assert!(validation.errors.is_empty());
    }
}
