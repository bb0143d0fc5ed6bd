use std::sync::Arc;

use itertools::Itertools;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    shape::Method,
    value::{
        Value,
        convert::{self, Fit},
    },
};

pub(crate) type Args = SmallVec<[Value; 4]>;

/// Ranks a candidate: worst argument fit, then total fit, then fixed arity
/// over varargs.
fn score(method: &Method, args: &[Value]) -> Option<(Fit, u32, bool)> {
    let params = method.params();
    let fits: Option<Vec<Fit>> = if method.is_varargs() {
        let (rest, fixed) = params.split_last()?;
        if args.len() < fixed.len() {
            return None;
        }
        args.iter()
            .enumerate()
            .map(|(i, arg)| convert::fit(arg, fixed.get(i).unwrap_or(rest)))
            .collect()
    } else {
        if args.len() != params.len() {
            return None;
        }
        args.iter().zip(params).map(|(arg, hint)| convert::fit(arg, hint)).collect()
    };
    let fits = fits?;

    let worst = fits.iter().copied().min().unwrap_or(Fit::Exact);
    let total = fits.iter().map(|fit| *fit as u32).sum();
    Some((worst, total, !method.is_varargs()))
}

/// Best overload for `args`; the first declared wins a tie.
pub(crate) fn select<'m>(candidates: &'m [Arc<Method>], args: &[Value]) -> Option<&'m Arc<Method>> {
    candidates
        .iter()
        .filter_map(|method| score(method, args).map(|score| (score, method)))
        .fold(None, |best: Option<((Fit, u32, bool), &Arc<Method>)>, (score, method)| match best {
            Some((best_score, _)) if best_score >= score => best,
            _ => Some((score, method)),
        })
        .map(|(_, method)| method)
}

/// Converts `args` to the declared parameter types, collecting trailing
/// varargs into one list.
pub(crate) fn prepare(method: &Method, args: &[Value]) -> Option<Args> {
    let params = method.params();
    if !method.is_varargs() {
        return args
            .iter()
            .zip(params)
            .map(|(arg, hint)| convert::coerce(arg, hint))
            .collect();
    }

    let (rest, fixed) = params.split_last()?;
    let mut prepared: Args = args
        .iter()
        .zip(fixed)
        .map(|(arg, hint)| convert::coerce(arg, hint))
        .collect::<Option<_>>()?;
    let trailing: Vec<Value> = args
        .get(fixed.len()..)
        .unwrap_or_default()
        .iter()
        .map(|arg| convert::coerce(arg, rest))
        .collect::<Option<_>>()?;
    prepared.push(Value::list(trailing));
    Some(prepared)
}

pub(crate) fn describe(args: &[Value]) -> SmolStr {
    args.iter().map(Value::type_name).join(", ").into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Shape, ShapeBuilder, TypeHint};
    use rstest::rstest;

    fn shape() -> Arc<Shape> {
        ShapeBuilder::<Value>::empty("test.Overloads".into())
            .raw_method("f", &[TypeHint::Int], false, Arc::new(|_, _| Ok(Value::from("int"))))
            .raw_method("f", &[TypeHint::Long], false, Arc::new(|_, _| Ok(Value::from("long"))))
            .raw_method("f", &[TypeHint::String], false, Arc::new(|_, _| Ok(Value::from("string"))))
            .raw_method("f", &[TypeHint::Any], false, Arc::new(|_, _| Ok(Value::from("any"))))
            .raw_method(
                "g",
                &[TypeHint::String, TypeHint::Int],
                true,
                Arc::new(|_, args| Ok(Value::from(args.len()))),
            )
            .build()
    }

    #[rstest]
    #[case::exact_int(vec![Value::from(1)], Some("int"))]
    #[case::exact_long(vec![Value::from(1i64)], Some("long"))]
    #[case::exact_string(vec![Value::from("x")], Some("string"))]
    #[case::any_beats_coercion(vec![Value::from(true)], Some("any"))]
    #[case::widening_over_any(vec![Value::Char('c')], Some("string"))]
    #[case::no_arity(vec![], None)]
    fn test_select(#[case] args: Vec<Value>, #[case] expected: Option<&str>) {
        let shape = shape();
        let selected = select(shape.methods("f"), &args)
            .map(|method| method.invoke(&Value::Null, &args).unwrap().to_string());
        assert_eq!(selected.as_deref(), expected);
    }

    #[test]
    fn test_prepare_collects_varargs() {
        let shape = shape();
        let method = &shape.methods("g")[0];
        let args = [Value::from("p"), Value::from(1), Value::from("2"), Value::from(3i64)];
        let prepared = prepare(method, &args).unwrap();
        assert_eq!(prepared.len(), 2);
        assert_eq!(
            prepared[1],
            Value::list([Value::from(1), Value::from(2), Value::from(3)])
        );
    }

    #[test]
    fn test_varargs_accepts_no_trailing() {
        let shape = shape();
        let args = [Value::from("p")];
        let method = select(shape.methods("g"), &args).unwrap();
        assert_eq!(prepare(method, &args).unwrap()[1], Value::list([]));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&[Value::from(1), Value::Null]), "int, null");
    }
}
