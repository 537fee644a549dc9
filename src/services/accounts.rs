use serde::Deserialize;
use tracing::{info, instrument};
use validator::Validate;

use super::Bookstore;
use crate::domain::aggregates::{Customer, CustomerId, CustomerLookup};
use crate::repository::NewCustomer;
use crate::{BookstoreError, Result};

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct RegisterCustomer {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 20))]
    pub phone: String,
}

impl Bookstore {
    /// Creates a regular (non-VIP) customer. Usernames are unique.
    #[instrument(skip(self, form), fields(username = %form.username))]
    pub async fn register_customer(&self, form: RegisterCustomer) -> Result<Customer> {
        form.validate()?;
        let mut uow = self.repo.begin().await?;
        let customer = uow
            .insert_customer(&NewCustomer { username: form.username, name: form.name, phone: form.phone, vip: false })
            .await?;
        uow.commit().await?;
        info!(customer_id = %customer.id, "customer registered");
        Ok(customer)
    }

    #[instrument(skip(self))]
    pub async fn set_vip(&self, id: CustomerId, vip: bool) -> Result<Customer> {
        let mut uow = self.repo.begin().await?;
        let CustomerLookup::Found(mut customer) = uow.customer(id).await? else {
            return Err(BookstoreError::CustomerNotFound(id));
        };
        customer.vip = vip;
        uow.save_customer(&customer).await?;
        uow.commit().await?;
        Ok(customer)
    }

    pub async fn customer(&self, id: CustomerId) -> Result<CustomerLookup> {
        Ok(self.repo.find_customer(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::services::testing::fixture;

    fn form(username: &str) -> RegisterCustomer {
        RegisterCustomer { username: username.into(), name: "Ann".into(), phone: "555".into() }
    }

    #[tokio::test]
    async fn test_register_and_promote() {
        let f = fixture(Settings::default());
        let ann = f.store.register_customer(form("ann")).await.unwrap();
        assert!(!ann.vip);

        let promoted = f.store.set_vip(ann.id, true).await.unwrap();
        assert!(promoted.vip);
        assert_eq!(f.store.customer(ann.id).await.unwrap(), CustomerLookup::Found(promoted));
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let f = fixture(Settings::default());
        f.store.register_customer(form("ann")).await.unwrap();
        assert!(matches!(f.store.register_customer(form("ann")).await, Err(BookstoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_register_validates_fields() {
        let f = fixture(Settings::default());
        assert!(matches!(f.store.register_customer(form("")).await, Err(BookstoreError::Validation(_))));
        assert!(matches!(f.store.set_vip(CustomerId(5), true).await, Err(BookstoreError::CustomerNotFound(_))));
        assert_eq!(f.store.customer(CustomerId(5)).await.unwrap(), CustomerLookup::NotFound);
    }
}
