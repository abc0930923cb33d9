//! Host interop bridge
//!
//! Sable reaches the embedding program through [`HostBridge`]. The bridge
//! resolves constructors, methods and fields on a [`HostTarget`] into a
//! [`HostMember`] handle, then invokes or reads through that handle.
//!
//! [`NoHost`] rejects every lookup. [`NativeHost`] is a registry of Rust
//! closures grouped by type name.

use crate::error::{HostFailure, Result, SableError};
use crate::parser::ast::Literal;
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

// ============================================================================
// Host values
// ============================================================================

/// Opaque value owned by the host, shared by reference
#[derive(Clone)]
pub struct HostObject {
    type_name: Rc<str>,
    inner: Rc<RefCell<dyn Any>>,
}

impl HostObject {
    pub fn new<T: Any>(type_name: &str, value: T) -> Self {
        HostObject {
            type_name: Rc::from(type_name),
            inner: Rc::new(RefCell::new(value)),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Borrow the payload as `T`. Fails if it holds something else or is
    /// already mutably borrowed.
    pub fn downcast_ref<T: Any>(&self) -> Result<Ref<'_, T>> {
        let cell = self.inner.try_borrow().map_err(|_| self.in_use())?;
        Ref::filter_map(cell, |value| value.downcast_ref::<T>()).map_err(|_| self.not_a::<T>())
    }

    /// Mutably borrow the payload as `T`. Fails if it holds something else
    /// or is already borrowed.
    pub fn downcast_mut<T: Any>(&self) -> Result<RefMut<'_, T>> {
        let cell = self.inner.try_borrow_mut().map_err(|_| self.in_use())?;
        RefMut::filter_map(cell, |value| value.downcast_mut::<T>()).map_err(|_| self.not_a::<T>())
    }

    fn in_use(&self) -> SableError {
        SableError::host(
            HostFailure::IllegalAccess,
            format!("{} is already borrowed", self),
        )
    }

    fn not_a<T: Any>(&self) -> SableError {
        SableError::host(
            HostFailure::IllegalAccess,
            format!("{} does not hold a {}", self, std::any::type_name::<T>()),
        )
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<{}>", self.type_name)
    }
}

/// What a member is looked up on
#[derive(Debug, Clone)]
pub enum HostTarget {
    /// A type named by `@Type`
    Static(String),
    /// An evaluated value
    Instance(Literal),
}

impl HostTarget {
    pub fn type_name(&self) -> String {
        match self {
            HostTarget::Static(name) => name.clone(),
            HostTarget::Instance(value) => value.lang_type(),
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, HostTarget::Static(_))
    }

    /// Receiver object for instance members
    pub fn object(&self) -> Option<&HostObject> {
        match self {
            HostTarget::Instance(value) => value.as_object(),
            HostTarget::Static(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Constructor,
    Method,
    Field,
}

/// A resolved member, handed back to the bridge for invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMember {
    pub type_name: String,
    pub name: String,
    pub kind: MemberKind,
    /// Bridge-specific index of the resolved overload
    pub slot: usize,
}

/// Seam between the evaluator and a host runtime
pub trait HostBridge {
    fn resolve_constructor(&self, type_name: &str, args: &[Literal]) -> Result<HostMember>;

    fn resolve_method(&self, target: &HostTarget, name: &str, args: &[Literal]) -> Result<HostMember>;

    fn resolve_field(&self, target: &HostTarget, name: &str) -> Result<HostMember>;

    /// Call a constructor or method
    fn invoke(&self, member: &HostMember, target: &HostTarget, args: Vec<Literal>) -> Result<Literal>;

    fn get_field(&self, member: &HostMember, target: &HostTarget) -> Result<Literal>;

    /// Write a field and return the stored value
    fn set_field(&self, member: &HostMember, target: &HostTarget, value: Literal) -> Result<Literal>;
}

fn not_found(type_name: &str, name: &str) -> SableError {
    SableError::host(
        HostFailure::MemberNotFound,
        format!("No member {} on {}", name, type_name),
    )
}

/// Bridge with nothing behind it
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHost;

impl HostBridge for NoHost {
    fn resolve_constructor(&self, type_name: &str, _args: &[Literal]) -> Result<HostMember> {
        Err(SableError::host(
            HostFailure::MemberNotFound,
            format!("No host type: {}", type_name),
        ))
    }

    fn resolve_method(&self, target: &HostTarget, name: &str, _args: &[Literal]) -> Result<HostMember> {
        Err(not_found(&target.type_name(), name))
    }

    fn resolve_field(&self, target: &HostTarget, name: &str) -> Result<HostMember> {
        Err(not_found(&target.type_name(), name))
    }

    fn invoke(&self, member: &HostMember, _target: &HostTarget, _args: Vec<Literal>) -> Result<Literal> {
        Err(not_found(&member.type_name, &member.name))
    }

    fn get_field(&self, member: &HostMember, _target: &HostTarget) -> Result<Literal> {
        Err(not_found(&member.type_name, &member.name))
    }

    fn set_field(&self, member: &HostMember, _target: &HostTarget, _value: Literal) -> Result<Literal> {
        Err(not_found(&member.type_name, &member.name))
    }
}

// ============================================================================
// Argument matching
// ============================================================================

/// Whether an argument of type `from` may be passed where `to` is expected
pub fn widens_to(from: &str, to: &str) -> bool {
    if to.eq_ignore_ascii_case("any") || from.eq_ignore_ascii_case(to) {
        return true;
    }
    matches!(
        (from, to),
        ("int", "long" | "float" | "double") | ("long", "float" | "double") | ("float", "double")
    )
}

/// Convert a numeric argument to the parameter's representation
fn coerce(value: Literal, param: &str) -> Literal {
    if !value.result_type().is_numeric() {
        return value;
    }
    match param {
        "long" => Literal::Long(value.as_long()),
        "float" => Literal::Float(value.as_float()),
        "double" => Literal::Double(value.as_double()),
        _ => value,
    }
}

fn arguments_match(params: &[String], args: &[Literal]) -> bool {
    params.len() == args.len()
        && params
            .iter()
            .zip(args)
            .all(|(param, arg)| widens_to(&arg.lang_type(), param))
}

// ============================================================================
// Native host
// ============================================================================

pub type NativeFn = Rc<dyn Fn(&HostTarget, &[Literal]) -> anyhow::Result<Literal>>;
pub type NativeGetter = Rc<dyn Fn(&HostTarget) -> anyhow::Result<Literal>>;
pub type NativeSetter = Rc<dyn Fn(&HostTarget, Literal) -> anyhow::Result<()>>;

struct NativeMethod {
    name: String,
    params: Vec<String>,
    is_static: bool,
    func: NativeFn,
}

struct NativeField {
    name: String,
    is_static: bool,
    getter: NativeGetter,
    setter: Option<NativeSetter>,
}

/// A type exposed to scripts, built up with chained registrations
pub struct NativeType {
    name: String,
    constructors: Vec<NativeMethod>,
    methods: Vec<NativeMethod>,
    fields: Vec<NativeField>,
}

fn param_list(params: &[&str]) -> Vec<String> {
    params.iter().map(|p| p.to_ascii_lowercase()).collect()
}

impl NativeType {
    pub fn new(name: &str) -> Self {
        NativeType {
            name: name.to_string(),
            constructors: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn constructor<F>(mut self, params: &[&str], func: F) -> Self
    where
        F: Fn(&[Literal]) -> anyhow::Result<Literal> + 'static,
    {
        self.constructors.push(NativeMethod {
            name: "new".to_string(),
            params: param_list(params),
            is_static: true,
            func: Rc::new(move |_, args| func(args)),
        });
        self
    }

    /// Instance method; the receiver arrives as the target
    pub fn method<F>(mut self, name: &str, params: &[&str], func: F) -> Self
    where
        F: Fn(&HostTarget, &[Literal]) -> anyhow::Result<Literal> + 'static,
    {
        self.methods.push(NativeMethod {
            name: name.to_string(),
            params: param_list(params),
            is_static: false,
            func: Rc::new(func),
        });
        self
    }

    pub fn static_method<F>(mut self, name: &str, params: &[&str], func: F) -> Self
    where
        F: Fn(&[Literal]) -> anyhow::Result<Literal> + 'static,
    {
        self.methods.push(NativeMethod {
            name: name.to_string(),
            params: param_list(params),
            is_static: true,
            func: Rc::new(move |_, args| func(args)),
        });
        self
    }

    /// Instance field, read-only unless a setter is given
    pub fn field<G>(mut self, name: &str, getter: G, setter: Option<NativeSetter>) -> Self
    where
        G: Fn(&HostTarget) -> anyhow::Result<Literal> + 'static,
    {
        self.fields.push(NativeField {
            name: name.to_string(),
            is_static: false,
            getter: Rc::new(getter),
            setter,
        });
        self
    }

    pub fn static_field<G>(mut self, name: &str, getter: G, setter: Option<NativeSetter>) -> Self
    where
        G: Fn(&HostTarget) -> anyhow::Result<Literal> + 'static,
    {
        self.fields.push(NativeField {
            name: name.to_string(),
            is_static: true,
            getter: Rc::new(getter),
            setter,
        });
        self
    }
}

type CacheKey = (String, String, usize);

/// Registry of native types with a per-arity resolution cache
#[derive(Default)]
pub struct NativeHost {
    types: HashMap<String, NativeType>,
    cache: RefCell<HashMap<CacheKey, usize>>,
}

impl NativeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, native: NativeType) {
        self.cache.borrow_mut().clear();
        self.types.insert(native.name.clone(), native);
    }

    pub fn with_type(mut self, native: NativeType) -> Self {
        self.register(native);
        self
    }

    pub fn cached_resolutions(&self) -> usize {
        self.cache.borrow().len()
    }

    fn native_type(&self, name: &str) -> Result<&NativeType> {
        self.types
            .get(name)
            .ok_or_else(|| SableError::host(HostFailure::MemberNotFound, format!("No host type: {}", name)))
    }

    /// Pick the overload of `name` whose parameters accept `args`
    fn select(
        &self,
        native: &NativeType,
        candidates: &[NativeMethod],
        name: &str,
        args: &[Literal],
    ) -> Option<usize> {
        let key = (native.name.clone(), name.to_string(), args.len());
        if let Some(&slot) = self.cache.borrow().get(&key) {
            if candidates
                .get(slot)
                .is_some_and(|m| m.name == name && arguments_match(&m.params, args))
            {
                trace!(type_name = %native.name, member = name, slot, "host resolution cache hit");
                return Some(slot);
            }
        }

        let slot = candidates
            .iter()
            .position(|m| m.name == name && arguments_match(&m.params, args))?;
        self.cache.borrow_mut().insert(key, slot);
        Some(slot)
    }

    fn method_at(&self, member: &HostMember) -> Result<&NativeMethod> {
        let native = self.native_type(&member.type_name)?;
        let table = match member.kind {
            MemberKind::Constructor => &native.constructors,
            MemberKind::Method => &native.methods,
            MemberKind::Field => {
                return Err(SableError::host(
                    HostFailure::IllegalAccess,
                    format!("{} is a field, not a method", member.name),
                ))
            }
        };
        table
            .get(member.slot)
            .ok_or_else(|| not_found(&member.type_name, &member.name))
    }

    fn field_at(&self, member: &HostMember) -> Result<&NativeField> {
        let native = self.native_type(&member.type_name)?;
        native
            .fields
            .get(member.slot)
            .filter(|_| member.kind == MemberKind::Field)
            .ok_or_else(|| not_found(&member.type_name, &member.name))
    }

    fn check_receiver(is_static: bool, target: &HostTarget, member: &HostMember) -> Result<()> {
        if !is_static && target.is_static() {
            return Err(SableError::host(
                HostFailure::IllegalAccess,
                format!(
                    "Instance member {} of {} requires a receiver",
                    member.name, member.type_name
                ),
            ));
        }
        Ok(())
    }
}

fn invocation_failure(member: &HostMember, err: anyhow::Error) -> SableError {
    SableError::host(
        HostFailure::Invocation,
        format!("{}:{} failed: {:#}", member.type_name, member.name, err),
    )
}

impl HostBridge for NativeHost {
    fn resolve_constructor(&self, type_name: &str, args: &[Literal]) -> Result<HostMember> {
        let native = self.native_type(type_name)?;
        let slot = self
            .select(native, &native.constructors, "new", args)
            .ok_or_else(|| {
                SableError::host(
                    HostFailure::MemberNotFound,
                    format!("No constructor of {} accepts {} arguments", type_name, args.len()),
                )
            })?;
        Ok(HostMember {
            type_name: type_name.to_string(),
            name: "new".to_string(),
            kind: MemberKind::Constructor,
            slot,
        })
    }

    fn resolve_method(&self, target: &HostTarget, name: &str, args: &[Literal]) -> Result<HostMember> {
        let type_name = target.type_name();
        let native = self.native_type(&type_name)?;
        let slot = self
            .select(native, &native.methods, name, args)
            .ok_or_else(|| not_found(&type_name, name))?;
        Ok(HostMember {
            type_name,
            name: name.to_string(),
            kind: MemberKind::Method,
            slot,
        })
    }

    fn resolve_field(&self, target: &HostTarget, name: &str) -> Result<HostMember> {
        let type_name = target.type_name();
        let native = self.native_type(&type_name)?;
        let slot = native
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| not_found(&type_name, name))?;
        Ok(HostMember {
            type_name,
            name: name.to_string(),
            kind: MemberKind::Field,
            slot,
        })
    }

    fn invoke(&self, member: &HostMember, target: &HostTarget, args: Vec<Literal>) -> Result<Literal> {
        let method = self.method_at(member)?;
        Self::check_receiver(method.is_static, target, member)?;

        let args: Vec<Literal> = args
            .into_iter()
            .zip(&method.params)
            .map(|(arg, param)| coerce(arg, param))
            .collect();
        (method.func)(target, &args).map_err(|err| invocation_failure(member, err))
    }

    fn get_field(&self, member: &HostMember, target: &HostTarget) -> Result<Literal> {
        let field = self.field_at(member)?;
        Self::check_receiver(field.is_static, target, member)?;
        (field.getter)(target).map_err(|err| invocation_failure(member, err))
    }

    fn set_field(&self, member: &HostMember, target: &HostTarget, value: Literal) -> Result<Literal> {
        let field = self.field_at(member)?;
        Self::check_receiver(field.is_static, target, member)?;
        let setter = field.setter.as_ref().ok_or_else(|| {
            SableError::host(
                HostFailure::IllegalAccess,
                format!("Field {} of {} is read-only", member.name, member.type_name),
            )
        })?;
        setter(target, value.clone()).map_err(|err| invocation_failure(member, err))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use anyhow::anyhow;

    #[derive(Debug)]
    struct Counter {
        count: i64,
    }

    fn counter_host() -> NativeHost {
        NativeHost::new().with_type(
            NativeType::new("Counter")
                .constructor(&[], |_| Ok(Literal::Object(HostObject::new("Counter", Counter { count: 0 }))))
                .constructor(&["long"], |args| {
                    Ok(Literal::Object(HostObject::new(
                        "Counter",
                        Counter { count: args[0].as_long() },
                    )))
                })
                .method("bump", &[], |target, _| {
                    let object = target.object().ok_or_else(|| anyhow!("no receiver"))?;
                    let mut counter = object.downcast_mut::<Counter>()?;
                    counter.count += 1;
                    Ok(Literal::Long(counter.count))
                })
                .static_method("half", &["double"], |args| Ok(Literal::Double(args[0].as_double() / 2.0)))
                .static_method("fail", &[], |_| Err(anyhow!("always fails")))
                .static_field("LIMIT", |_| Ok(Literal::Int(10)), None),
        )
    }

    #[test]
    fn test_widening_table() {
        assert!(widens_to("int", "int"));
        assert!(widens_to("int", "double"));
        assert!(widens_to("long", "float"));
        assert!(widens_to("float", "double"));
        assert!(!widens_to("double", "float"));
        assert!(!widens_to("long", "int"));
        assert!(!widens_to("boolean", "int"));
        assert!(widens_to("string", "string"));
        assert!(widens_to("boolean", "any"));
    }

    #[test]
    fn test_no_host_rejects_everything() {
        let err = NoHost.resolve_constructor("Thing", &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Host(HostFailure::MemberNotFound));
        let target = HostTarget::Instance(Literal::Int(1));
        assert!(NoHost.resolve_method(&target, "call", &[]).is_err());
        assert!(NoHost.resolve_field(&target, "x").is_err());
    }

    #[test]
    fn test_constructor_overloads_and_instance_method() {
        let host = counter_host();
        let member = host.resolve_constructor("Counter", &[Literal::Int(5)]).unwrap();
        assert_eq!(member.slot, 1);

        let target = HostTarget::Static("Counter".to_string());
        let object = host.invoke(&member, &target, vec![Literal::Int(5)]).unwrap();
        assert_eq!(object.lang_type(), "Counter");

        let receiver = HostTarget::Instance(object);
        let bump = host.resolve_method(&receiver, "bump", &[]).unwrap();
        assert_eq!(host.invoke(&bump, &receiver, vec![]).unwrap(), Literal::Long(6));
        assert_eq!(host.invoke(&bump, &receiver, vec![]).unwrap(), Literal::Long(7));
    }

    #[test]
    fn test_static_method_widens_arguments() {
        let host = counter_host();
        let target = HostTarget::Static("Counter".to_string());
        let half = host.resolve_method(&target, "half", &[Literal::Int(3)]).unwrap();
        assert_eq!(
            host.invoke(&half, &target, vec![Literal::Int(3)]).unwrap(),
            Literal::Double(1.5)
        );
        assert!(host.resolve_method(&target, "half", &[Literal::string("x")]).is_err());
    }

    #[test]
    fn test_resolution_is_cached() {
        let host = counter_host();
        let target = HostTarget::Static("Counter".to_string());
        host.resolve_method(&target, "half", &[Literal::Int(3)]).unwrap();
        host.resolve_method(&target, "half", &[Literal::Double(3.0)]).unwrap();
        assert_eq!(host.cached_resolutions(), 1);
    }

    #[test]
    fn test_failures_are_classified() {
        let host = counter_host();
        let target = HostTarget::Static("Counter".to_string());

        let fail = host.resolve_method(&target, "fail", &[]).unwrap();
        let err = host.invoke(&fail, &target, vec![]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Host(HostFailure::Invocation));
        assert!(err.message.contains("always fails"));

        let bump = host.resolve_method(&target, "bump", &[]).unwrap();
        let err = host.invoke(&bump, &target, vec![]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Host(HostFailure::IllegalAccess));

        let limit = host.resolve_field(&target, "LIMIT").unwrap();
        assert_eq!(host.get_field(&limit, &target).unwrap(), Literal::Int(10));
        let err = host.set_field(&limit, &target, Literal::Int(1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Host(HostFailure::IllegalAccess));
    }

    #[test]
    fn test_object_identity() {
        let a = HostObject::new("Counter", Counter { count: 0 });
        let b = a.clone();
        let c = HostObject::new("Counter", Counter { count: 0 });
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.to_string(), "#<Counter>");
        assert!(a.downcast_ref::<String>().is_err());
    }

    #[test]
    fn test_nested_borrow_is_an_error() {
        let a = HostObject::new("Counter", Counter { count: 0 });
        let held = a.downcast_mut::<Counter>().unwrap();

        let err = a.downcast_mut::<Counter>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Host(HostFailure::IllegalAccess));
        assert!(err.message.contains("already borrowed"));
        assert!(a.downcast_ref::<Counter>().is_err());

        drop(held);
        assert_eq!(a.downcast_ref::<Counter>().unwrap().count, 0);
    }
}
