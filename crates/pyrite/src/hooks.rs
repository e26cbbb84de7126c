/// A call-site rewriter attached to a function.
///
/// Hooks are not first-class values in the pipeline: they are either a format
/// template read from decorator metadata, or one of a closed set of native
/// rules the builtins registry installs. A hook that returns `None` signals
/// "not applicable" and the call falls through to default emission.
#[derive(Debug, Clone)]
pub enum Rewriter {
    /// `@js(inline="{self} === {other}")` style template.
    Template(String),
    /// A builtin rule that can inspect argument types.
    Native(NativeRule),
}

/// The type of one rendered call argument, as seen by native rules.
#[derive(Debug, Clone)]
pub struct ArgType {
    /// Concrete class name (`int`, `list__int`, `Counter__list__int`).
    pub name: String,
    /// Template name without specialization suffix (`list` for `list__int`).
    pub generic: String,
}

/// Everything a rewriter may consult: the rendered receiver, the rendered
/// argument strings, their types, and the callee's parameter names.
#[derive(Debug)]
pub struct RewriteCall<'a> {
    pub receiver: Option<&'a str>,
    pub args: &'a [String],
    pub arg_types: &'a [ArgType],
    /// Parameter names excluding the receiver, aligned with `args`.
    pub params: &'a [String],
}

impl RewriteCall<'_> {
    fn placeholder(&self, name: &str) -> Option<&str> {
        if name == "self" {
            return self.receiver;
        }
        let index = self.params.iter().position(|p| p == name)?;
        self.args.get(index).map(String::as_str)
    }
}

impl Rewriter {
    /// Renders the call, or returns `None` when the rule does not apply.
    pub fn apply(&self, call: &RewriteCall<'_>) -> Option<String> {
        match self {
            Self::Template(template) => format_template(template, call),
            Self::Native(rule) => rule.apply(call),
        }
    }
}

/// Substitutes `{name}` placeholders with the receiver and argument strings.
fn format_template(template: &str, call: &RewriteCall<'_>) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}')?;
        out.push_str(call.placeholder(&after[..close])?);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// The closed set of native call-site rules used by the builtins registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeRule {
    /// Numeric operator: `a op b` (or reflected `b op a`), optionally wrapped
    /// (`Math.floor(a / b)`). Applies only to numeric and boolean operands.
    IntOp {
        op: &'static str,
        reflected: bool,
        wrap: Option<&'static str>,
    },
    /// `int(x)`: string operands become `parseInt(x, 10)`.
    IntInit,
    /// `str(x)`: always `String(x)`.
    StrInit,
    /// `list + list` concatenation.
    ListConcat,
    /// `len(x)` over strings, arrays and maps.
    Len,
    /// `isinstance(x, T)` with per-type TL checks.
    IsInstance,
    /// `print(x)`, spreading iterables.
    Print,
}

impl NativeRule {
    fn apply(self, call: &RewriteCall<'_>) -> Option<String> {
        match self {
            Self::IntOp { op, reflected, wrap } => {
                let this = call.receiver?;
                let other = call.args.first()?;
                let arg_type = call.arg_types.first()?;
                if !matches!(arg_type.name.as_str(), "int" | "bool" | "float") {
                    return None;
                }
                let body = if reflected {
                    format!("{other} {op} {this}")
                } else {
                    format!("{this} {op} {other}")
                };
                Some(match wrap {
                    Some(wrap) => format!("{wrap}({body})"),
                    None => body,
                })
            }
            Self::IntInit => {
                let other = call.args.first()?;
                let arg_type = call.arg_types.first()?;
                (arg_type.name == "str").then(|| format!("parseInt({other}, 10)"))
            }
            Self::StrInit => {
                let other = call.args.first()?;
                Some(format!("String({other})"))
            }
            Self::ListConcat => {
                let this = call.receiver?;
                let other = call.args.first()?;
                let arg_type = call.arg_types.first()?;
                (arg_type.generic == "list").then(|| format!("{this}.concat({other})"))
            }
            Self::Len => {
                let obj = call.args.first()?;
                let arg_type = call.arg_types.first()?;
                match arg_type.generic.as_str() {
                    "str" | "list" | "tuple" => Some(format!("{obj}.length")),
                    "dict" => Some(format!("{obj}.size")),
                    _ => None,
                }
            }
            Self::IsInstance => {
                let obj = call.args.first()?;
                let ty = call.args.get(1)?;
                Some(match ty.as_str() {
                    "list" => format!("Array.isArray({obj})"),
                    "dict" => format!("({obj} instanceof Map)"),
                    "int" => format!("Number.isInteger({obj})"),
                    "float" => format!("(typeof {obj} === 'number' && !Number.isInteger({obj}))"),
                    "str" => format!("(typeof {obj} === 'string')"),
                    "bool" => format!("(typeof {obj} === 'boolean')"),
                    _ => format!("({obj} instanceof {ty})"),
                })
            }
            Self::Print => {
                let obj = call.args.first()?;
                let arg_type = call.arg_types.first()?;
                if arg_type.generic == "Iterable" {
                    Some(format!("console.log(...{obj})"))
                } else {
                    Some(format!("console.log({obj})"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call<'a>(receiver: Option<&'a str>, args: &'a [String], types: &'a [ArgType], params: &'a [String]) -> RewriteCall<'a> {
        RewriteCall {
            receiver,
            args,
            arg_types: types,
            params,
        }
    }

    fn int_type() -> ArgType {
        ArgType {
            name: "int".to_string(),
            generic: "int".to_string(),
        }
    }

    #[test]
    fn template_substitutes_receiver_and_params() {
        let rewriter = Rewriter::Template("{self}.splice({index}, 0, {item})".to_string());
        let args = vec!["0".to_string(), "x".to_string()];
        let types = vec![int_type(), int_type()];
        let params = vec!["index".to_string(), "item".to_string()];
        let rendered = rewriter.apply(&call(Some("items"), &args, &types, &params));
        assert_eq!(rendered.as_deref(), Some("items.splice(0, 0, x)"));
    }

    #[test]
    fn int_op_rejects_non_int_operand() {
        let rule = NativeRule::IntOp {
            op: "+",
            reflected: false,
            wrap: None,
        };
        let args = vec!["b".to_string()];
        let types = vec![ArgType {
            name: "str".to_string(),
            generic: "str".to_string(),
        }];
        assert_eq!(rule.apply(&call(Some("a"), &args, &types, &[])), None);
    }

    #[test]
    fn int_op_reflected_swaps_operands() {
        let rule = NativeRule::IntOp {
            op: "-",
            reflected: true,
            wrap: None,
        };
        let args = vec!["b".to_string()];
        let types = vec![int_type()];
        assert_eq!(rule.apply(&call(Some("a"), &args, &types, &[])).as_deref(), Some("b - a"));
    }
}
