//! Emission of error records.

use super::data::escape_json_pointer;
use super::keyword::KeywordCxt;
use crate::codegen::{ErrorExtension, ErrorTemplate, Expr, Name, Op, Verbose};
use crate::definition::{ErrorCxt, ErrorDescriptor};

/// Appends one error record.
///
/// When stopping at the first failure, the run returns `false` with this record alone.
pub(crate) fn report_error(cxt: &mut KeywordCxt<'_, '_>, error: &ErrorDescriptor) {
    let template = error_template(cxt, error);
    if !(cxt.it.composite_rule || cxt.session.options().all_errors) {
        let none = cxt.session.code.declare_const("_errs", Expr::lit(0));
        cxt.session.code.emit(Op::ResetErrors(none));
    }
    cxt.session.code.emit(Op::PushError(template));
    return_on_failure(cxt);
}

/// Like [`report_error`], for records added on top of errors the keyword already produced.
///
/// When stopping at the first failure, the run returns with every record collected so far.
pub(crate) fn report_extra_error(cxt: &mut KeywordCxt<'_, '_>, error: &ErrorDescriptor) {
    let template = error_template(cxt, error);
    cxt.session.code.emit(Op::PushError(template));
    return_on_failure(cxt);
}

/// Back-fills this keyword's context onto records appended since `errs_count`.
pub(crate) fn extend_errors(cxt: &mut KeywordCxt<'_, '_>, errs_count: &Name) {
    let extension = ErrorExtension {
        since: errs_count.clone(),
        keyword: cxt.keyword.into(),
        schema_path: keyword_schema_path(cxt),
        data: cxt.it.data.clone(),
        verbose: verbose(cxt),
    };
    cxt.session.code.emit(Op::ExtendErrors(extension));
}

fn return_on_failure(cxt: &mut KeywordCxt<'_, '_>) {
    if !(cxt.it.composite_rule || cxt.session.options().all_errors) {
        cxt.session.code.return_(false);
    }
}

fn error_template(cxt: &KeywordCxt<'_, '_>, error: &ErrorDescriptor) -> ErrorTemplate {
    let error_cxt = ErrorCxt {
        keyword: cxt.keyword,
        schema: cxt.schema,
        schema_code: &cxt.schema_code,
        parent_schema: cxt.it.schema,
        params: &cxt.params,
    };

    ErrorTemplate {
        keyword: cxt.keyword.into(),
        schema_path: keyword_schema_path(cxt),
        data: cxt.it.data.clone(),
        params: (error.params)(&error_cxt).into_vec(),
        message: cxt
            .session
            .options()
            .messages
            .then(|| (error.message)(&error_cxt)),
        verbose: verbose(cxt),
    }
}

fn keyword_schema_path(cxt: &KeywordCxt<'_, '_>) -> String {
    format!(
        "{}/{}",
        cxt.it.err_schema_path,
        escape_json_pointer(cxt.keyword)
    )
}

fn verbose(cxt: &KeywordCxt<'_, '_>) -> Option<Verbose> {
    cxt.session.options().verbose.then(|| Verbose {
        schema: if cxt.is_data() {
            cxt.schema_code.clone()
        } else {
            cxt.schema_value.clone()
        },
        parent_schema: Expr::Schema {
            top: cxt.it.top_schema_ref,
            pointer: cxt.it.schema_path.clone(),
        },
    })
}
