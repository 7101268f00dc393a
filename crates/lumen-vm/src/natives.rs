//! natives.rs — fonctions natives (host) exposées aux scripts Lumen.

use lumen_core::{Heap, Obj, Value};

/// Secondes écoulées depuis l'époque Unix — horloge murale plutôt que temps
/// CPU du processus, suffisant pour mesurer des durées dans un script et
/// plus simple à exposer sans état VM additionnel.
pub fn clock_native(_args: &[Value], _heap: &mut Heap) -> Result<Value, String> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| "system clock is before the Unix epoch".to_string())?;
    Ok(Value::Number(now.as_secs_f64()))
}

/// Supprime un champ d'une instance. Renvoie toujours `nil`, y compris pour
/// des arguments mal typés — l'échec est silencieux plutôt que de lever une
/// erreur runtime.
pub fn delete_field_native(args: &[Value], heap: &mut Heap) -> Result<Value, String> {
    if args.len() != 2 {
        return Ok(Value::Nil);
    }
    let Value::Obj(instance_ref) = args[0] else { return Ok(Value::Nil) };
    if !matches!(heap.get(instance_ref), Obj::Instance(_)) {
        return Ok(Value::Nil);
    }
    let Value::Obj(name_ref) = args[1] else { return Ok(Value::Nil) };
    if !matches!(heap.get(name_ref), Obj::String(_)) {
        return Ok(Value::Nil);
    }
    let hash = heap.as_string_hash(name_ref);
    heap.as_instance_mut(instance_ref).fields.delete(name_ref, hash);
    Ok(Value::Nil)
}
