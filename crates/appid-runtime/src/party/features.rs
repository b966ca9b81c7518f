//! Per-party feature objects.

use crate::IdentityError;
use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Typed bag of features attached to a party.
///
/// At most one feature per type. Features are attached by drivers during
/// setup and live as long as the party.
///
/// # Example
///
/// ```
/// use appid_runtime::party::FeatureSet;
///
/// struct Signer(&'static str);
///
/// let features = FeatureSet::new("D/$P/#Dev");
/// features.add(Signer("k1")).unwrap();
/// assert!(features.add(Signer("k2")).is_err());
/// assert_eq!(features.get::<Signer>().unwrap().0, "k1");
/// ```
pub struct FeatureSet {
    party: String,
    features: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl FeatureSet {
    /// Empty set for the party named `party`.
    #[must_use]
    pub fn new(party: impl Into<String>) -> Self {
        Self {
            party: party.into(),
            features: RwLock::new(HashMap::new()),
        }
    }

    /// Attaches `feature`.
    ///
    /// # Errors
    ///
    /// [`IdentityError::DuplicateFeature`] if a `T` is already attached.
    pub fn add<T: Any + Send + Sync>(&self, feature: T) -> Result<Arc<T>, IdentityError> {
        let mut features = self.features.write();
        if features.contains_key(&TypeId::of::<T>()) {
            return Err(IdentityError::DuplicateFeature {
                party: self.party.clone(),
                feature: type_name::<T>(),
            });
        }
        let feature = Arc::new(feature);
        features.insert(TypeId::of::<T>(), Arc::clone(&feature) as Arc<dyn Any + Send + Sync>);
        Ok(feature)
    }

    /// The attached `T`, if any.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let feature = self.features.read().get(&TypeId::of::<T>()).cloned()?;
        feature.downcast::<T>().ok()
    }

    /// The attached `T`.
    ///
    /// # Errors
    ///
    /// [`IdentityError::FeatureNotFound`] if none is attached.
    pub fn get_required<T: Any + Send + Sync>(&self) -> Result<Arc<T>, IdentityError> {
        self.get::<T>().ok_or_else(|| IdentityError::FeatureNotFound {
            party: self.party.clone(),
            feature: type_name::<T>(),
        })
    }

    /// Whether a `T` is attached.
    #[must_use]
    pub fn contains<T: Any>(&self) -> bool {
        self.features.read().contains_key(&TypeId::of::<T>())
    }

    /// Number of attached features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.read().len()
    }

    /// True when nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.read().is_empty()
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureSet")
            .field("party", &self.party)
            .field("count", &self.len())
            .finish()
    }
}
