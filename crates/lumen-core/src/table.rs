//! table.rs — table de hachage à adressage ouvert, réutilisée pour les
//! globales de la VM, les membres de classe, les champs d'instance, et (via
//! `find_string`) la table d'internement de chaînes du `Heap`.
//!
//! Toute clé de cette table est un `ObjRef` vers une `LString` déjà
//! internée ; `hash` est toujours le hash FNV-1a précalculé de cette chaîne
//! (`Heap::as_string_hash`), jamais l'indice `ObjRef` lui-même — exactement
//! comme le `Table` original clé par `ObjString*` et haché par son champ
//! `->hash` précalculé, quel que soit l'usage (globales, méthodes, champs,
//! internement).
//!
//! Capacité puissance de deux (minimum 8), facteur de charge 0.75, sondage
//! linéaire, tombstones représentées par `key = None, value = Bool(true)`
//! (une entrée réellement vide a `value = Nil`).

use crate::heap::Heap;
use crate::object::ObjRef;
use crate::value::Value;

const MIN_CAPACITY: usize = 8;
const MAX_LOAD: f64 = 0.75;

#[derive(Debug, Clone)]
struct Entry {
    key: Option<ObjRef>,
    hash: u32,
    value: Value,
}

impl Entry {
    const EMPTY: Entry = Entry { key: None, hash: 0, value: Value::Nil };
}

#[derive(Debug, Clone)]
pub struct Table {
    entries: Vec<Entry>,
    count: usize,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    pub fn new() -> Self {
        Self { entries: Vec::new(), count: 0 }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Sonde à partir de `hash`, retournant l'indice de la première
    /// tombstone rencontrée si la clé n'est pas trouvée, sinon le premier
    /// emplacement réellement vide.
    fn find_entry(entries: &[Entry], key: ObjRef, hash: u32) -> usize {
        let capacity = entries.len();
        let mut index = (hash as usize) & (capacity - 1);
        let mut tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            match entry.key {
                None => {
                    if entry.value.is_nil() {
                        return tombstone.unwrap_or(index);
                    } else if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Some(k) if k == key => return index,
                Some(_) => {}
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    fn grow(&mut self, capacity: usize) {
        let mut new_entries = vec![Entry::EMPTY; capacity];
        let mut new_count = 0;
        for entry in &self.entries {
            if let Some(key) = entry.key {
                let idx = Self::find_entry(&new_entries, key, entry.hash);
                new_entries[idx] = Entry { key: Some(key), hash: entry.hash, value: entry.value };
                new_count += 1;
            }
        }
        self.entries = new_entries;
        self.count = new_count;
    }

    /// Insère ou met à jour `key -> value`. Retourne `true` si c'est une
    /// nouvelle clé.
    pub fn set(&mut self, key: ObjRef, hash: u32, value: Value) -> bool {
        if self.count + 1 > ((self.capacity() as f64) * MAX_LOAD) as usize {
            let new_cap = (self.capacity() * 2).max(MIN_CAPACITY);
            self.grow(new_cap);
        }
        let idx = Self::find_entry(&self.entries, key, hash);
        let is_new = self.entries[idx].key.is_none();
        if is_new && self.entries[idx].value.is_nil() {
            self.count += 1;
        }
        self.entries[idx] = Entry { key: Some(key), hash, value };
        is_new
    }

    pub fn get(&self, key: ObjRef, hash: u32) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let idx = Self::find_entry(&self.entries, key, hash);
        self.entries[idx].key.map(|_| self.entries[idx].value)
    }

    /// Supprime `key`, laissant une tombstone derrière elle. Retourne
    /// `true` si la clé existait.
    pub fn delete(&mut self, key: ObjRef, hash: u32) -> bool {
        if self.count == 0 {
            return false;
        }
        let idx = Self::find_entry(&self.entries, key, hash);
        if self.entries[idx].key.is_none() {
            return false;
        }
        self.entries[idx] = Entry { key: None, hash: 0, value: Value::Bool(true) };
        true
    }

    /// Copie toutes les entrées de `self` dans `dst`, utilisé pour
    /// l'héritage de méthodes (§4.6).
    pub fn add_all_into(&self, dst: &mut Table) {
        for entry in &self.entries {
            if let Some(key) = entry.key {
                dst.set(key, entry.hash, entry.value);
            }
        }
    }

    /// Recherche par contenu, utilisée uniquement par la table d'internement
    /// de chaînes : compare le texte réel des candidates via le tas, pas
    /// seulement leur indice — nécessaire puisqu'au moment de l'appel la
    /// chaîne cherchée n'a pas encore forcément d'`ObjRef`.
    pub fn find_string(&self, heap: &Heap, text: &str, hash: u32) -> Option<ObjRef> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.entries.len();
        let mut index = (hash as usize) & (capacity - 1);
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    if entry.value.is_nil() {
                        return None;
                    }
                }
                Some(key) => {
                    if entry.hash == hash && heap.as_string(key) == text {
                        return Some(key);
                    }
                }
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    /// Marque toutes les clés et valeurs de la table (racines du GC pour les
    /// tables de globales/méthodes/champs).
    pub fn mark(&self, heap: &mut Heap, gray: &mut Vec<ObjRef>) {
        for entry in &self.entries {
            if let Some(key) = entry.key {
                heap.mark_object(key, gray);
            }
            heap.mark_value(entry.value, gray);
        }
    }

    /// Retire les entrées dont la clé pointe vers un objet non marqué.
    /// Utilisé uniquement sur la table d'internement, juste avant le sweep,
    /// pour que les chaînes mortes cessent d'être trouvables par
    /// `find_string` (elles ne sont donc PAS elles-mêmes des racines).
    pub fn remove_white(&mut self, is_marked: impl Fn(ObjRef) -> bool) {
        for entry in &mut self.entries {
            if let Some(key) = entry.key {
                if !is_marked(key) {
                    *entry = Entry { key: None, hash: 0, value: Value::Bool(true) };
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries.iter().filter_map(|e| e.key.map(|k| (k, e.value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_roundtrip() {
        let mut t = Table::new();
        assert!(t.set(1, 1, Value::Number(10.0)));
        assert!(!t.set(1, 1, Value::Number(20.0)));
        assert_eq!(t.get(1, 1).unwrap().as_number(), Some(20.0));
        assert!(t.delete(1, 1));
        assert!(t.get(1, 1).is_none());
        assert!(!t.delete(1, 1));
    }

    #[test]
    fn grows_past_load_factor() {
        let mut t = Table::new();
        for i in 0..100u32 {
            t.set(i, i, Value::Number(f64::from(i)));
        }
        assert_eq!(t.len(), 100);
        for i in 0..100u32 {
            assert_eq!(t.get(i, i).unwrap().as_number(), Some(f64::from(i)));
        }
    }

    #[test]
    fn tombstones_do_not_break_later_probes() {
        let mut t = Table::new();
        t.set(1, 1, Value::Bool(true));
        t.set(9, 9, Value::Bool(false)); // collision avec 1 à capacité 8
        t.delete(1, 1);
        assert!(t.get(9, 9).is_some());
    }
}
