//! Runtime value representation. Two interchangeable encodings live side by side;
//! exactly one is compiled in, selected by the `nan_boxing` feature. Both expose the
//! same free-function/method surface so the rest of the crate never matches on feature
//! flags itself.

#[cfg(not(feature = "nan_boxing"))]
mod tagged;
#[cfg(not(feature = "nan_boxing"))]
pub use tagged::{boolean, nil, number, object, Value};

#[cfg(feature = "nan_boxing")]
mod nanbox;
#[cfg(feature = "nan_boxing")]
pub use nanbox::{boolean, nil, number, object, Value};

use crate::objects::object::ObjectType;

impl Value {
    pub fn is_object_type(&self, ty: ObjectType) -> bool {
        self.is_object() && unsafe { (*self.as_object()).obj_type == ty }
    }

    pub fn is_string(&self) -> bool {
        self.is_object_type(ObjectType::String)
    }
    pub fn is_function(&self) -> bool {
        self.is_object_type(ObjectType::Function)
    }
    pub fn is_native(&self) -> bool {
        self.is_object_type(ObjectType::Native)
    }
    pub fn is_closure(&self) -> bool {
        self.is_object_type(ObjectType::Closure)
    }
    pub fn is_class(&self) -> bool {
        self.is_object_type(ObjectType::Class)
    }
    pub fn is_instance(&self) -> bool {
        self.is_object_type(ObjectType::Instance)
    }
    pub fn is_bound_method(&self) -> bool {
        self.is_object_type(ObjectType::BoundMethod)
    }

    /// Safety: caller must have already checked the matching `is_*` predicate.
    pub unsafe fn as_string(&self) -> &crate::objects::object_string::ObjectString {
        (*self.as_object()).as_string()
    }
    pub unsafe fn as_function(&self) -> &crate::objects::object_function::ObjectFunction {
        (*self.as_object()).as_function()
    }
    pub unsafe fn as_native(&self) -> &crate::objects::object_native::ObjectNative {
        (*self.as_object()).as_native()
    }
    pub unsafe fn as_closure(&self) -> &crate::objects::object_closure::ObjectClosure {
        (*self.as_object()).as_closure()
    }
    pub unsafe fn as_class(&self) -> &crate::objects::object_class::ObjectClass {
        (*self.as_object()).as_class()
    }
    pub unsafe fn as_instance(&self) -> &crate::objects::object_instance::ObjectInstance {
        (*self.as_object()).as_instance()
    }
    pub unsafe fn as_bound_method(&self) -> &crate::objects::object_bound_method::ObjectBoundMethod {
        (*self.as_object()).as_bound_method()
    }
}

/// Prints a value the way a running script would: numbers without a trailing `.0`,
/// strings bare (no quotes), objects by their `<kind name>` form.
pub fn print_value(value: &Value) {
    print!("{}", format_value(value));
}

pub fn format_value(value: &Value) -> String {
    if value.is_nil() {
        return "nil".to_string();
    }
    if value.is_bool() {
        return value.as_bool().to_string();
    }
    if value.is_number() {
        let n = value.as_number();
        return if n.fract() == 0.0 && n.is_finite() {
            format!("{}", n as i64)
        } else {
            format!("{}", n)
        };
    }
    unsafe {
        if value.is_string() {
            return value.as_string().content.clone();
        }
        if value.is_function() {
            return format_function(value.as_function());
        }
        if value.is_native() {
            return "<native fn>".to_string();
        }
        if value.is_closure() {
            return format_function(&*value.as_closure().function);
        }
        if value.is_class() {
            return value.as_class().name.clone();
        }
        if value.is_instance() {
            return format!("{} instance", (*value.as_instance().class).name);
        }
        if value.is_bound_method() {
            return format_function(&*(*value.as_bound_method().method).function);
        }
    }
    "<object>".to_string()
}

fn format_function(function: &crate::objects::object_function::ObjectFunction) -> String {
    if function.name.is_empty() {
        "<script>".to_string()
    } else {
        format!("<fn {}>", function.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_integral_numbers_without_a_decimal_point() {
        assert_eq!(format_value(&number(3.0)), "3");
        assert_eq!(format_value(&number(3.5)), "3.5");
    }

    #[test]
    fn formats_nil_and_booleans() {
        assert_eq!(format_value(&nil()), "nil");
        assert_eq!(format_value(&boolean(true)), "true");
        assert_eq!(format_value(&boolean(false)), "false");
    }
}
