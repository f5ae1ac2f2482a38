//! Compilation context
//!
//! One `CompilationContext` lives for a whole compiler invocation. It owns the
//! class registry, the compilation units, the pending-work queue and the set of
//! files currently running their header stages. Stages receive it explicitly;
//! there is no process-wide state.
//!
//! Loading is lazy. A class that is not registered yet is looked up on the search
//! path; a source file found there is parsed and taken through the header stages
//! (discovery, type resolution, skeleton building) immediately, then queued for
//! the body stages. A file that is already mid-compilation is never re-entered:
//! `load` hands back whatever skeleton is registered, complete or not.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{Ast, ClassKind};
use crate::common::classfile::ClassFile;
use crate::common::classpath::{canonical, ClassLocation, SearchPath};
use crate::common::const_eval::ConstEvaluator;
use crate::common::constant::Constant;
use crate::common::env::{
    ClassRef, ClassSymbol, CompilePhase, ConstState, FieldRef, FieldSymbol, MethodRef, MethodSymbol,
    Origin,
};
use crate::common::flags::{access_flags, Modifiers};
use crate::common::import::ImportScope;
use crate::common::prelude::PRELUDE_ROOT;
use crate::common::types::{parse_field_descriptor, parse_method_descriptor, ClassType, Type};
use crate::config::Config;
use crate::consts::{CONSTRUCTOR_METHOD_NAME, MAX_HIERARCHY_DEPTH, STATIC_INITIALIZER_METHOD_NAME};
use crate::error::{Error, Result, ResultExt};
use crate::ir::IrClass;
use crate::parser::parse;

pub type UnitId = usize;

/// One source file taken through the pipeline
#[derive(Debug)]
pub struct CompilationUnit {
    /// Canonical path, or the relative path of an in-memory source
    pub path: PathBuf,
    /// Taken out by the stage currently working on it
    pub ast: Option<Ast>,
    pub imports: ImportScope,
    /// Named classes declared in this unit, in discovery order
    pub classes: Vec<ClassType>,
    pub phase: CompilePhase,
    /// Prelude units only run the header stages
    pub is_prelude: bool,
}

impl CompilationUnit {
    pub fn package(&self) -> &str {
        &self.imports.package
    }
}

#[derive(Debug)]
pub struct CompilationContext {
    config: Config,
    search_path: SearchPath,
    registry: IndexMap<ClassType, ClassRef>,
    units: Vec<CompilationUnit>,
    unit_paths: HashMap<PathBuf, UnitId>,
    pending: VecDeque<UnitId>,
    compiling: HashSet<PathBuf>,
    output: Vec<IrClass>,
}

impl CompilationContext {
    pub fn new(config: Config) -> Self {
        let search_path = SearchPath::new(&config);
        Self {
            config,
            search_path,
            registry: IndexMap::new(),
            units: Vec::new(),
            unit_paths: HashMap::new(),
            pending: VecDeque::new(),
            compiling: HashSet::new(),
            output: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Make `source` visible at `path`, relative to the source root (`p/q/C.java`)
    pub fn add_virtual_source(&mut self, path: impl Into<PathBuf>, source: impl Into<String>) {
        self.search_path.add_memory_source(path, source);
    }

    // ----- compilation units -----

    pub fn unit(&self, id: UnitId) -> &CompilationUnit {
        &self.units[id]
    }

    pub fn unit_mut(&mut self, id: UnitId) -> &mut CompilationUnit {
        &mut self.units[id]
    }

    pub fn units(&self) -> &[CompilationUnit] {
        &self.units
    }

    pub fn take_ast(&mut self, id: UnitId) -> Result<Ast> {
        self.units[id]
            .ast
            .take()
            .ok_or_else(|| Error::internal(format!("AST of '{}' is already taken", self.units[id].path.display())))
    }

    pub fn put_ast(&mut self, id: UnitId, ast: Ast) {
        self.units[id].ast = Some(ast);
    }

    pub fn is_compiling(&self, path: &Path) -> bool {
        self.compiling.contains(path)
    }

    /// Run `f` with `path` marked as mid-compilation, clearing the mark on every exit path
    pub fn with_compiling<T>(&mut self, path: &Path, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.compiling.insert(path.to_path_buf());
        let result = f(self);
        self.compiling.remove(path);
        result
    }

    /// Open a root file and run its header stages; body stages run in `drain`
    pub fn compile_root(&mut self, path: &Path) -> Result<UnitId> {
        let key = if self.search_path.has_memory_source(path) {
            path.to_path_buf()
        } else {
            canonical(path)
        };
        if let Some(&id) = self.unit_paths.get(&key) {
            return Ok(id);
        }
        let source = self.search_path.read_source(&key)?;
        self.open_unit(key, &source, false)
    }

    /// Run the body stages of every queued unit, including dependencies queued meanwhile
    pub fn drain(&mut self) -> Result<()> {
        while let Some(id) = self.pending.pop_front() {
            log::debug!("dequeued '{}' ({} left)", self.units[id].path.display(), self.pending.len());
            crate::wash::run_body_stages(self, id)?;
        }
        Ok(())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn open_unit(&mut self, path: PathBuf, source: &str, is_prelude: bool) -> Result<UnitId> {
        let ast = parse(source).in_file(&path)?;
        let imports = ImportScope::from_ast(&ast);
        let id = self.units.len();
        self.units.push(CompilationUnit {
            path: path.clone(),
            ast: Some(ast),
            imports,
            classes: Vec::new(),
            phase: CompilePhase::Discovered,
            is_prelude,
        });
        self.unit_paths.insert(path.clone(), id);
        log::debug!("opened unit {} for '{}'", id, path.display());
        self.with_compiling(&path, |ctx| crate::wash::run_header_stages(ctx, id))?;
        if !is_prelude {
            self.pending.push_back(id);
            log::trace!("queued '{}'", path.display());
        }
        Ok(id)
    }

    // ----- output -----

    pub fn emit(&mut self, class: IrClass) {
        self.output.push(class);
    }

    pub fn output(&self) -> &[IrClass] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<IrClass> {
        std::mem::take(&mut self.output)
    }

    // ----- registry -----

    pub fn get(&self, ty: &ClassType) -> Option<ClassRef> {
        self.registry.get(&ty.erased()).cloned()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassRef> {
        self.registry.values()
    }

    pub fn register(&mut self, class: ClassSymbol) -> Result<ClassRef> {
        let key = class.ty.erased();
        if self.registry.contains_key(&key) {
            return Err(Error::type_error(format!("duplicate class '{}'", key)));
        }
        log::trace!("registered {} {}", class.kind, key);
        let handle = Rc::new(RefCell::new(class));
        self.registry.insert(key, handle.clone());
        Ok(handle)
    }

    pub fn load(&mut self, ty: &ClassType) -> Result<ClassRef> {
        self.try_load(ty)?
            .ok_or_else(|| Error::class_not_found(ty.erased().qualified_name()))
    }

    /// Like `load`, but a class missing from the search path is `None`
    pub fn try_load(&mut self, ty: &ClassType) -> Result<Option<ClassRef>> {
        let key = ty.erased();
        if let Some(class) = self.registry.get(&key) {
            return Ok(Some(class.clone()));
        }
        let location = match self.search_path.find(&key) {
            Some(location) => location,
            None => return Ok(None),
        };
        match location {
            ClassLocation::Source(path) => {
                if self.unit_paths.contains_key(&path) || self.compiling.contains(&path) {
                    // The file is known; the class simply is not declared in it
                    return Ok(self.get(&key));
                }
                log::debug!("loading {} from '{}'", key, path.display());
                let source = self.search_path.read_source(&path)?;
                self.open_unit(path, &source, false)
                    .map_err(|e| e.in_dependency(key.qualified_name()))?;
            }
            ClassLocation::Compiled(path) => {
                log::debug!("loading {} from '{}'", key, path.display());
                self.load_compiled(&path)?;
            }
            ClassLocation::Prelude(source) => {
                let path = PathBuf::from(PRELUDE_ROOT).join(SearchPath::source_file_name(&key));
                if !self.unit_paths.contains_key(&path) {
                    log::trace!("loading prelude {}", key.top_level());
                    self.open_unit(path, source, true)
                        .map_err(|e| e.in_dependency(key.qualified_name()))?;
                }
            }
        }
        Ok(self.get(&key))
    }

    fn load_compiled(&mut self, path: &Path) -> Result<ClassRef> {
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        let file = ClassFile::parse(&bytes).map_err(|source| Error::ClassFormat {
            path: path.to_path_buf(),
            source,
        })?;
        let ty = ClassType::from_internal(&file.this_class);
        let kind = if file.access_flags & access_flags::ACC_INTERFACE != 0 {
            ClassKind::Interface
        } else if file.access_flags & access_flags::ACC_ENUM != 0 {
            ClassKind::Enum
        } else {
            ClassKind::Class
        };
        let own_entry = file.own_inner_entry();
        let bits = own_entry.map(|e| e.access_flags).unwrap_or(file.access_flags);
        let flags = Modifiers::new(bits).without(access_flags::ACC_SUPER | access_flags::ACC_INTERFACE);
        let mut class = ClassSymbol::new(ty.clone(), kind, flags, Origin::Compiled(path.to_path_buf()));
        class.is_inner = kind == ClassKind::Class
            && own_entry.map(|e| e.outer.is_some() && e.access_flags & access_flags::ACC_STATIC == 0)
                == Some(true);
        class.is_anonymous = own_entry.map(|e| e.simple_name.is_none()) == Some(true);
        class.super_class = file.super_class.as_deref().map(|s| Type::Class(ClassType::from_internal(s)));
        class.interfaces = file
            .interfaces
            .iter()
            .map(|i| Type::Class(ClassType::from_internal(i)))
            .collect();
        for field in &file.fields {
            let Some(field_ty) = parse_field_descriptor(&field.descriptor) else {
                continue;
            };
            let mut symbol = FieldSymbol::new(&field.name, field_ty, Modifiers::new(field.access_flags), ty.clone());
            if let Some(value) = &field.constant {
                symbol.constant = ConstState::Value(value.clone());
            }
            class.add_field(symbol);
        }
        for method in &file.methods {
            let synthetic = method.access_flags & (access_flags::ACC_SYNTHETIC | access_flags::ACC_BRIDGE) != 0;
            if synthetic || method.name == STATIC_INITIALIZER_METHOD_NAME {
                continue;
            }
            let Some(mut sig) = parse_method_descriptor(&method.descriptor) else {
                continue;
            };
            let mut symbol_leading = Vec::new();
            if method.name == CONSTRUCTOR_METHOD_NAME {
                let synthetic_params = if class.is_inner {
                    1
                } else if kind == ClassKind::Enum {
                    2
                } else {
                    0
                };
                let n = synthetic_params.min(sig.params.len());
                symbol_leading = sig.params.drain(..n).collect();
            }
            let mut symbol = MethodSymbol::new(&method.name, sig, Modifiers::new(method.access_flags), ty.clone());
            symbol.leading = symbol_leading;
            class.add_method(symbol);
        }
        for entry in &file.inner_classes {
            if entry.outer.as_deref() == Some(file.this_class.as_str()) {
                if let Some(name) = &entry.simple_name {
                    class.nested.push(ty.nested(name.clone()));
                }
            }
        }
        class.phase = CompilePhase::Lowered;
        self.register(class)
    }

    // ----- name resolution -----

    /// Resolve a simple type name in the scope of a compilation unit
    ///
    /// Order: single-type imports, top-level classes of the same unit, wildcard
    /// imports, the unit's own package, then `java.lang`.
    pub fn resolve(&mut self, simple_name: &str, unit: UnitId) -> Result<ClassType> {
        self.try_resolve(simple_name, unit)?
            .ok_or_else(|| Error::class_not_found(simple_name))
    }

    pub fn try_resolve(&mut self, simple_name: &str, unit: UnitId) -> Result<Option<ClassType>> {
        if let Some(import) = self.units[unit].imports.single(simple_name).cloned() {
            return match self.resolve_qualified(&import.qualified_name)? {
                Some(ty) => Ok(Some(ty)),
                None => Err(Error::class_not_found(&import.qualified_name)).at(import.span),
            };
        }

        let same_unit = self.units[unit]
            .classes
            .iter()
            .find(|c| c.components.len() == 1 && c.simple_name() == simple_name)
            .cloned();
        if same_unit.is_some() {
            return Ok(same_unit);
        }

        let wildcards = self.units[unit].imports.wildcards.clone();
        let mut found: Option<ClassType> = None;
        for wildcard in &wildcards {
            let candidate = match self.resolve_qualified(wildcard)? {
                // `import p.C.*;` imports the member types of C
                Some(owner) => self.find_member_type(&owner, simple_name)?,
                None => {
                    let ty = ClassType::new(wildcard.clone(), simple_name);
                    self.try_load(&ty)?.map(|_| ty)
                }
            };
            if let Some(candidate) = candidate {
                match &found {
                    Some(previous) if previous != &candidate => {
                        return Err(Error::type_error(format!(
                            "reference to '{}' is ambiguous: both '{}' and '{}' match",
                            simple_name, previous, candidate
                        )));
                    }
                    _ => found = Some(candidate),
                }
            }
        }
        if found.is_some() {
            return Ok(found);
        }

        let own = ClassType::new(self.units[unit].package(), simple_name);
        if self.try_load(&own)?.is_some() {
            return Ok(Some(own));
        }
        let lang = ClassType::java_lang(simple_name);
        if self.try_load(&lang)?.is_some() {
            return Ok(Some(lang));
        }
        Ok(None)
    }

    /// Resolve a dotted name such as `java.util.Map.Entry`, longest package first
    pub fn resolve_qualified(&mut self, dotted: &str) -> Result<Option<ClassType>> {
        let segments: Vec<&str> = dotted.split('.').collect();
        for split in (0..segments.len()).rev() {
            let package = segments[..split].join(".");
            let top = ClassType::new(package, segments[split]);
            if self.try_load(&top)?.is_none() {
                continue;
            }
            let mut current = top;
            let mut complete = true;
            for member in &segments[split + 1..] {
                match self.find_member_type(&current, member)? {
                    Some(next) => current = next,
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                return Ok(Some(current));
            }
        }
        Ok(None)
    }

    /// Resolve a simple name seen inside `enclosing` (innermost first): member types
    /// of the lexically enclosing classes and their supertypes, then `resolve`
    pub fn lookup_type_name(
        &mut self,
        simple_name: &str,
        enclosing: &[ClassType],
        unit: UnitId,
    ) -> Result<Option<ClassType>> {
        for class in enclosing {
            if let Some(found) = self.find_member_type(class, simple_name)? {
                return Ok(Some(found));
            }
            if class.simple_name() == simple_name {
                return Ok(Some(class.clone()));
            }
        }
        self.try_resolve(simple_name, unit)
    }

    /// Member type `name` of `owner`, declared or inherited
    pub fn find_member_type(&mut self, owner: &ClassType, name: &str) -> Result<Option<ClassType>> {
        let mut visited = HashSet::new();
        self.find_member_type_in(owner, name, &mut visited)
    }

    fn find_member_type_in(
        &mut self,
        owner: &ClassType,
        name: &str,
        visited: &mut HashSet<ClassType>,
    ) -> Result<Option<ClassType>> {
        let key = owner.erased();
        if !visited.insert(key.clone()) {
            return Ok(None);
        }
        let Some(class) = self.try_load(&key)? else {
            return Ok(None);
        };
        let candidate = key.nested(name);
        let (declared, compiled, supers) = {
            let class = class.borrow();
            (
                class.nested.contains(&candidate),
                matches!(class.origin, Origin::Compiled(_)),
                supertypes(&class),
            )
        };
        if declared {
            return Ok(Some(candidate));
        }
        if compiled && self.try_load(&candidate)?.is_some() {
            return Ok(Some(candidate));
        }
        for sup in supers {
            if let Some(found) = self.find_member_type_in(&sup, name, visited)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Whether some root, or the prelude, holds the package `name`
    pub fn is_package(&self, name: &str) -> bool {
        self.search_path.is_package(name)
    }

    // ----- members -----

    /// Field `name` of `owner` or its supertypes (superclass chain first, then interfaces)
    pub fn find_field(&mut self, owner: &ClassType, name: &str) -> Result<Option<FieldRef>> {
        let mut visited = HashSet::new();
        self.find_field_in(owner, name, &mut visited)
    }

    fn find_field_in(
        &mut self,
        owner: &ClassType,
        name: &str,
        visited: &mut HashSet<ClassType>,
    ) -> Result<Option<FieldRef>> {
        let key = owner.erased();
        if !visited.insert(key.clone()) {
            return Ok(None);
        }
        let class = self.load(&key)?;
        let (own, super_class, interfaces) = {
            let class = class.borrow();
            (
                class.field(name).map(FieldSymbol::to_ref),
                class.super_class.as_ref().and_then(Type::as_class).map(ClassType::erased),
                class
                    .interfaces
                    .iter()
                    .filter_map(Type::as_class)
                    .map(ClassType::erased)
                    .collect::<Vec<_>>(),
            )
        };
        if own.is_some() {
            return Ok(own);
        }
        let mut chain = super_class;
        let mut interfaces_seen = interfaces;
        let mut depth = 0;
        while let Some(sup) = chain {
            depth += 1;
            if depth > MAX_HIERARCHY_DEPTH || !visited.insert(sup.clone()) {
                break;
            }
            let class = self.load(&sup)?;
            let class = class.borrow();
            if let Some(field) = class.field(name) {
                return Ok(Some(field.to_ref()));
            }
            interfaces_seen.extend(class.interfaces.iter().filter_map(Type::as_class).map(ClassType::erased));
            chain = class.super_class.as_ref().and_then(Type::as_class).map(ClassType::erased);
        }
        for iface in interfaces_seen {
            if let Some(found) = self.find_field_in(&iface, name, visited)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    pub fn field_symbol(&mut self, owner: &ClassType, name: &str) -> Result<Option<FieldSymbol>> {
        let class = self.load(owner)?;
        let class = class.borrow();
        Ok(class.field(name).cloned())
    }

    /// Methods named `name` visible on `owner`: own first, then inherited ones not overridden
    pub fn find_methods(&mut self, owner: &ClassType, name: &str) -> Result<Vec<MethodRef>> {
        let mut found: Vec<MethodRef> = Vec::new();
        let mut queue = VecDeque::from([owner.erased()]);
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let class = self.load(&current)?;
            let class = class.borrow();
            let is_origin = current == owner.erased();
            for method in class.methods_named(name) {
                // Constructors are not inherited
                if method.is_constructor && !is_origin {
                    continue;
                }
                let descriptor = method.sig.erased().descriptor();
                let overridden = found
                    .iter()
                    .any(|m| m.sig.erased().descriptor() == descriptor && m.name == method.name);
                if !overridden {
                    found.push(method.to_ref(class.kind));
                }
            }
            if let Some(sup) = class.super_class.as_ref().and_then(Type::as_class) {
                queue.push_back(sup.erased());
            } else if class.is_interface() && name != CONSTRUCTOR_METHOD_NAME {
                // Interfaces see the public methods of the root type
                queue.push_back(ClassType::object());
            }
            for iface in class.interfaces.iter().filter_map(Type::as_class) {
                queue.push_back(iface.erased());
            }
        }
        Ok(found)
    }

    /// Current method record of a resolved reference, picking up synthetic parameters
    /// added after the reference was taken
    pub fn refresh_method(&mut self, method: &MethodRef) -> Result<MethodRef> {
        let class = self.load(&method.owner)?;
        let class = class.borrow();
        let descriptor = method.sig.erased().descriptor();
        let refreshed = class
            .methods_named(&method.name)
            .find(|m| m.sig.erased().descriptor() == descriptor)
            .map(|m| m.to_ref(class.kind))
            .unwrap_or_else(|| method.clone());
        Ok(refreshed)
    }

    // ----- type relations -----

    /// Subtyping by erasure
    pub fn is_subtype(&mut self, sub: &ClassType, sup: &ClassType) -> Result<bool> {
        let sub = sub.erased();
        let sup = sup.erased();
        if sub == sup || sup.is_object() {
            return Ok(true);
        }
        let mut queue = VecDeque::from([sub]);
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if current == sup {
                return Ok(true);
            }
            if !visited.insert(current.clone()) || visited.len() > MAX_HIERARCHY_DEPTH {
                continue;
            }
            let Some(class) = self.try_load(&current)? else {
                continue;
            };
            let class = class.borrow();
            queue.extend(supertypes(&class));
        }
        Ok(false)
    }

    /// View `ty` as its supertype `target`, carrying type arguments through the hierarchy
    ///
    /// Returns the erased `target` when `ty` is raw, `None` when it is not a subtype.
    pub fn as_super(&mut self, ty: &ClassType, target: &ClassType) -> Result<Option<ClassType>> {
        let mut visited = HashSet::new();
        self.as_super_in(ty, &target.erased(), &mut visited)
    }

    fn as_super_in(
        &mut self,
        ty: &ClassType,
        target: &ClassType,
        visited: &mut HashSet<ClassType>,
    ) -> Result<Option<ClassType>> {
        if &ty.erased() == target {
            return Ok(Some(ty.clone()));
        }
        if !visited.insert(ty.erased()) {
            return Ok(None);
        }
        let Some(class) = self.try_load(ty)? else {
            return Ok(None);
        };
        let (bindings, supers) = {
            let class = class.borrow();
            let raw = ty.args().is_empty() && !class.type_params.is_empty();
            let bindings: Vec<(String, Type)> = if raw {
                Vec::new()
            } else {
                type_param_names(&class.type_params)
                    .into_iter()
                    .zip(ty.args().iter().cloned())
                    .collect()
            };
            let mut supers: Vec<Type> = class.super_class.iter().cloned().collect();
            supers.extend(class.interfaces.iter().cloned());
            if raw {
                supers = supers.iter().map(Type::erasure).collect();
            }
            (bindings, supers)
        };
        for sup in supers {
            if let Type::Class(sup) = sup.substitute(&bindings) {
                if let Some(found) = self.as_super_in(&sup, target, visited)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    /// Type-variable bindings of `owner`'s parameters when seen through `receiver`
    pub fn member_bindings(&mut self, receiver: &Type, owner: &ClassType) -> Result<Vec<(String, Type)>> {
        let Type::Class(receiver) = receiver else {
            return Ok(Vec::new());
        };
        let Some(view) = self.as_super(receiver, owner)? else {
            return Ok(Vec::new());
        };
        if view.args().is_empty() {
            return Ok(Vec::new());
        }
        let class = self.load(owner)?;
        let params = type_param_names(&class.borrow().type_params);
        Ok(params.into_iter().zip(view.args().iter().cloned()).collect())
    }

    /// Whether `ty` extends itself through its superclass chain
    pub fn has_cyclic_superclass(&mut self, ty: &ClassType) -> Result<bool> {
        let start = ty.erased();
        let mut current = self.get(&start).and_then(|c| c.borrow().super_class.clone());
        for _ in 0..MAX_HIERARCHY_DEPTH {
            let Some(Type::Class(sup)) = current else {
                return Ok(false);
            };
            if sup.erased() == start {
                return Ok(true);
            }
            current = self.get(&sup).and_then(|c| c.borrow().super_class.clone());
        }
        Ok(true)
    }

    // ----- constants -----

    /// Compile-time constant value of field `owner.name`, evaluated on first demand
    pub fn field_constant(&mut self, owner: &ClassType, name: &str) -> Result<Option<Constant>> {
        let class = self.load(owner)?;
        let (pending, field_ty) = {
            let mut class = class.borrow_mut();
            let Some(field) = class.field_mut(name) else {
                return Ok(None);
            };
            match &field.constant {
                ConstState::NotConstant => return Ok(None),
                ConstState::Value(value) => return Ok(Some(value.clone())),
                ConstState::Evaluating => {
                    return Err(Error::cyclic(format!(
                        "constant '{}.{}' depends on its own value",
                        owner.qualified_name(),
                        name
                    )))
                }
                ConstState::Unevaluated(_) => {}
            }
            let pending = match std::mem::replace(&mut field.constant, ConstState::Evaluating) {
                ConstState::Unevaluated(pending) => pending,
                _ => return Err(Error::internal("constant state changed during evaluation")),
            };
            (pending, field.ty.clone())
        };

        log::trace!("evaluating constant {}.{}", owner.qualified_name(), name);
        let evaluated = ConstEvaluator::new(pending.unit, pending.scope.clone())
            .eval(self, &pending.init)
            .at(pending.init.span);
        let result = match evaluated {
            Ok(value) => value.and_then(|v| constant_for_field(&v, &field_ty)),
            Err(err) => {
                if let Some(field) = class.borrow_mut().field_mut(name) {
                    field.constant = ConstState::Unevaluated(pending);
                }
                return Err(err);
            }
        };
        if let Some(field) = class.borrow_mut().field_mut(name) {
            field.constant = match &result {
                Some(value) => ConstState::Value(value.clone()),
                None => ConstState::NotConstant,
            };
        }
        Ok(result)
    }
}

/// Direct supertypes of a class record, erased
pub fn supertypes(class: &ClassSymbol) -> Vec<ClassType> {
    class
        .super_class
        .iter()
        .chain(class.interfaces.iter())
        .filter_map(Type::as_class)
        .map(ClassType::erased)
        .collect()
}

/// Names of declared type parameters
pub fn type_param_names(params: &[Type]) -> Vec<String> {
    params
        .iter()
        .filter_map(|p| match p {
            Type::TypeVariable { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// Assignment conversion of a constant to the declared type of its field
fn constant_for_field(value: &Constant, field_ty: &Type) -> Option<Constant> {
    match field_ty {
        Type::Primitive(target) => {
            let source = value.primitive()?;
            if source.widens_to(*target) || value.fits_in(*target) {
                value.cast(*target)
            } else {
                None
            }
        }
        ty if ty.is_string() => match value {
            Constant::String(_) => Some(value.clone()),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> CompilationContext {
        CompilationContext::new(Config::default())
    }

    #[test]
    fn test_registry_shares_records() {
        let mut ctx = context();
        let ty = ClassType::new("p", "A");
        let handle = ctx
            .register(ClassSymbol::new(ty.clone(), ClassKind::Class, Modifiers::NONE, Origin::Prelude))
            .unwrap();
        handle.borrow_mut().is_inner = true;
        assert!(ctx.get(&ty).unwrap().borrow().is_inner);
        let duplicate = ClassSymbol::new(ty, ClassKind::Class, Modifiers::NONE, Origin::Prelude);
        assert!(ctx.register(duplicate).is_err());
    }

    #[test]
    fn test_prelude_loads_lazily() {
        let mut ctx = context();
        assert!(ctx.get(&ClassType::string()).is_none());
        let string = ctx.load(&ClassType::string()).unwrap();
        assert_eq!(string.borrow().phase, CompilePhase::SkeletonBuilt);
        assert!(ctx.is_subtype(&ClassType::string(), &ClassType::java_lang("CharSequence")).unwrap());
        assert!(!ctx.is_subtype(&ClassType::java_lang("Integer"), &ClassType::string()).unwrap());
        assert_eq!(ctx.pending_len(), 0);
    }

    #[test]
    fn test_missing_class() {
        let mut ctx = context();
        let err = ctx.load(&ClassType::new("no.such", "Thing")).unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::ClassNotFound));
        assert!(ctx.try_load(&ClassType::new("no.such", "Thing")).unwrap().is_none());
    }

    #[test]
    fn test_as_super_carries_arguments() {
        let mut ctx = context();
        let list_of_string = ClassType::new("java.util", "ArrayList").with_args(vec![Type::string()]);
        let iterable = ctx
            .as_super(&list_of_string, &ClassType::java_lang("Iterable"))
            .unwrap()
            .unwrap();
        assert_eq!(iterable.args(), &[Type::string()]);
        let raw = ctx
            .as_super(&ClassType::new("java.util", "ArrayList"), &ClassType::java_lang("Iterable"))
            .unwrap()
            .unwrap();
        assert!(raw.args().is_empty());
    }

    #[test]
    fn test_prelude_constants_are_lazy() {
        let mut ctx = context();
        let integer = ClassType::java_lang("Integer");
        assert_eq!(ctx.field_constant(&integer, "MAX_VALUE").unwrap(), Some(Constant::Int(i32::MAX)));
        assert_eq!(ctx.field_constant(&integer, "MIN_VALUE").unwrap(), Some(Constant::Int(i32::MIN)));
        let field = ctx.field_symbol(&integer, "MAX_VALUE").unwrap().unwrap();
        assert!(matches!(field.constant, ConstState::Value(Constant::Int(_))));
    }
}
