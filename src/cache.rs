use crate::error::{DataError, DataResult};
use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

// Tout enregistrement mis en cache expose son identifiant, seule clé du cache.
pub trait Keyed {
    fn key(&self) -> &str;
}

// Miroir en mémoire d'une table complète, indexé par identifiant.
//
// La `DashMap` absorbe les lectures/écritures ponctuelles concurrentes sans verrou global.
// L'`ArcSwap` autour permet de remplacer toute la table d'un seul échange de pointeur :
// un lecteur voit l'ancienne table ou la nouvelle, jamais un état vide intermédiaire.
pub struct CollectionCache<T: Keyed> {
    inner: ArcSwap<DashMap<String, Arc<T>>>,
}

impl<T: Keyed> CollectionCache<T> {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(DashMap::new()),
        }
    }

    // Ajoute un enregistrement. Une clé déjà présente viole l'invariant du cache.
    pub fn insert(&self, record: T) -> DataResult<()> {
        let map = self.inner.load();
        // L'entrée verrouille un segment de la table : elle doit être rendue avant `map`.
        let result = match map.entry(record.key().to_string()) {
            Entry::Occupied(entry) => Err(DataError::CacheCorruption(format!(
                "key '{}' is already cached",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(record));
                Ok(())
            }
        };
        result
    }

    // Remplace entièrement l'enregistrement ; une clé absente est une erreur et le cache reste intact.
    pub fn replace(&self, record: T) -> DataResult<()> {
        let map = self.inner.load();
        let result = match map.get_mut(record.key()) {
            Some(mut slot) => {
                *slot = Arc::new(record);
                Ok(())
            }
            None => Err(DataError::CacheMiss(format!(
                "key '{}' is not cached",
                record.key()
            ))),
        };
        result
    }

    pub fn remove(&self, key: &str) -> DataResult<Arc<T>> {
        self.inner
            .load()
            .remove(key)
            .map(|(_, record)| record)
            .ok_or_else(|| DataError::CacheMiss(format!("key '{}' is not cached", key)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.load().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.inner.load().get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    // Copie des valeurs actuelles ; l'ordre n'a pas de signification.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.inner
            .load()
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn find<P>(&self, pred: P) -> Option<Arc<T>>
    where
        P: Fn(&T) -> bool,
    {
        self.inner
            .load()
            .iter()
            .find(|entry| pred(entry.value()))
            .map(|entry| entry.value().clone())
    }

    pub fn filter<P>(&self, pred: P) -> Vec<Arc<T>>
    where
        P: Fn(&T) -> bool,
    {
        self.inner
            .load()
            .iter()
            .filter(|entry| pred(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    // Construit la nouvelle table à côté puis l'installe d'un seul `store`.
    pub fn reload<I>(&self, records: I)
    where
        I: IntoIterator<Item = T>,
    {
        let map: DashMap<String, Arc<T>> = records
            .into_iter()
            .map(|record| (record.key().to_string(), Arc::new(record)))
            .collect();
        self.inner.store(Arc::new(map));
    }

    pub fn clear(&self) {
        self.inner.store(Arc::new(DashMap::new()));
    }
}

impl<T: Keyed> Default for CollectionCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Détenteur de l'unique enregistrement "courant" d'un type d'entité.
pub struct SingletonCache<T> {
    current: ArcSwap<T>,
}

impl<T: Default> SingletonCache<T> {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(T::default()),
        }
    }

    pub fn current(&self) -> Arc<T> {
        self.current.load_full()
    }

    pub fn store(&self, record: T) {
        self.current.store(Arc::new(record));
    }

    // Remplacement conditionnel : `decide` voit l'enregistrement courant et renvoie le
    // remplaçant éventuel. Un écrivain concurrent ne peut pas intercaler son propre échange.
    pub fn swap_if<F>(&self, decide: F)
    where
        F: Fn(&T) -> Option<Arc<T>>,
    {
        self.current
            .rcu(|current| decide(&**current).unwrap_or_else(|| current.clone()));
    }

    // Retour à l'enregistrement sentinelle vide.
    pub fn reset(&self) {
        self.current.store(Arc::new(T::default()));
    }
}

impl<T: Default> Default for SingletonCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        label: String,
    }

    impl Keyed for Item {
        fn key(&self) -> &str {
            &self.id
        }
    }

    fn item(id: &str, label: &str) -> Item {
        Item {
            id: id.to_string(),
            label: label.to_string(),
        }
    }

    #[test]
    fn test_insert_then_duplicate_is_corruption() {
        let cache = CollectionCache::new();
        cache.insert(item("1", "a")).unwrap();
        let err = cache.insert(item("1", "b")).unwrap_err();
        assert!(matches!(err, DataError::CacheCorruption(_)));
        assert_eq!(cache.get("1").unwrap().label, "a");
    }

    #[test]
    fn test_replace_missing_key_leaves_cache_unchanged() {
        let cache = CollectionCache::new();
        cache.insert(item("1", "a")).unwrap();
        let err = cache.replace(item("2", "b")).unwrap_err();
        assert!(matches!(err, DataError::CacheMiss(_)));
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains("2"));
    }

    #[test]
    fn test_replace_and_remove() {
        let cache = CollectionCache::new();
        cache.insert(item("1", "a")).unwrap();
        cache.replace(item("1", "b")).unwrap();
        assert_eq!(cache.get("1").unwrap().label, "b");

        let removed = cache.remove("1").unwrap();
        assert_eq!(removed.label, "b");
        assert!(cache.is_empty());
        assert!(matches!(cache.remove("1"), Err(DataError::CacheMiss(_))));
    }

    #[test]
    fn test_reload_replaces_whole_contents() {
        let cache = CollectionCache::new();
        cache.insert(item("old", "x")).unwrap();
        cache.reload(vec![item("1", "a"), item("2", "b")]);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("old"));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_find_and_filter() {
        let cache = CollectionCache::new();
        cache.reload(vec![item("1", "a"), item("2", "b"), item("3", "a")]);
        assert_eq!(cache.filter(|i| i.label == "a").len(), 2);
        assert_eq!(cache.find(|i| i.label == "b").unwrap().id, "2");
        assert!(cache.find(|i| i.label == "z").is_none());
    }

    #[test]
    fn test_readers_never_observe_empty_cache_during_reloads() {
        let cache = Arc::new(CollectionCache::new());
        cache.reload((0..50).map(|i| item(&i.to_string(), "v")));

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let cache = cache.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                let mut min_seen = usize::MAX;
                while !stop.load(Ordering::Relaxed) {
                    min_seen = min_seen.min(cache.snapshot().len());
                }
                min_seen
            })
        };

        for round in 0..200 {
            let size = if round % 2 == 0 { 50 } else { 60 };
            cache.reload((0..size).map(|i| item(&i.to_string(), "v")));
        }
        stop.store(true, Ordering::Relaxed);

        let min_seen = reader.join().unwrap();
        assert!(min_seen >= 50, "reader saw a partial cache of {}", min_seen);
    }

    #[derive(Debug, Default, PartialEq)]
    struct Current {
        id: String,
        rank: u32,
    }

    #[test]
    fn test_singleton_store_reset_and_swap_if() {
        let cache: SingletonCache<Current> = SingletonCache::new();
        assert_eq!(*cache.current(), Current::default());

        cache.store(Current {
            id: "a".into(),
            rank: 2,
        });
        cache.swap_if(|cur| {
            (cur.rank < 1).then(|| {
                Arc::new(Current {
                    id: "b".into(),
                    rank: 1,
                })
            })
        });
        assert_eq!(cache.current().id, "a");

        cache.swap_if(|cur| {
            (cur.rank < 3).then(|| {
                Arc::new(Current {
                    id: "c".into(),
                    rank: 3,
                })
            })
        });
        assert_eq!(cache.current().id, "c");

        cache.reset();
        assert_eq!(cache.current().id, "");
    }
}
