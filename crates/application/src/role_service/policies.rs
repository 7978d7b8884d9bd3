use super::*;

use rolestore_domain::RoleTag;

impl RoleService {
    /// Replaces the trust policy.
    pub async fn update_trust_policy(
        &self,
        name: &str,
        tenant: &Tenant,
        trust_policy: &str,
    ) -> AppResult<ObjVersion> {
        let ((), version) = self
            .modify(name, tenant, |role| {
                role.update_trust_policy(trust_policy);
                Ok(())
            })
            .await?;
        Ok(version)
    }

    /// Replaces the maximum session duration.
    pub async fn update_max_session_duration(
        &self,
        name: &str,
        tenant: &Tenant,
        seconds: u64,
    ) -> AppResult<ObjVersion> {
        let ((), version) = self
            .modify(name, tenant, |role| role.set_max_session_duration(seconds))
            .await?;
        Ok(version)
    }

    /// Attaches or replaces an inline permission policy.
    pub async fn put_role_policy(
        &self,
        name: &str,
        tenant: &Tenant,
        policy_name: &str,
        policy: &str,
    ) -> AppResult<ObjVersion> {
        if policy_name.is_empty() {
            return Err(AppError::Validation(
                "policy name must not be empty".to_owned(),
            ));
        }

        let ((), version) = self
            .modify(name, tenant, |role| {
                role.set_perm_policy(policy_name, policy);
                Ok(())
            })
            .await?;
        Ok(version)
    }

    /// Returns one attached permission policy document.
    pub async fn get_role_policy(
        &self,
        name: &str,
        tenant: &Tenant,
        policy_name: &str,
    ) -> AppResult<String> {
        let stored = self.get_role(name, tenant).await?;
        stored
            .value
            .info
            .get_role_policy(policy_name)
            .map(str::to_owned)
    }

    /// Lists attached permission policy names, sorted.
    pub async fn list_role_policies(&self, name: &str, tenant: &Tenant) -> AppResult<Vec<String>> {
        let stored = self.get_role(name, tenant).await?;
        Ok(stored.value.info.get_role_policy_names())
    }

    /// Detaches a permission policy; a missing policy is not found.
    pub async fn delete_role_policy(
        &self,
        name: &str,
        tenant: &Tenant,
        policy_name: &str,
    ) -> AppResult<ObjVersion> {
        let ((), version) = self
            .modify(name, tenant, |role| role.delete_policy(policy_name))
            .await?;
        Ok(version)
    }

    /// Adds tags to the role's tag set.
    pub async fn tag_role(
        &self,
        name: &str,
        tenant: &Tenant,
        tags: Vec<RoleTag>,
    ) -> AppResult<ObjVersion> {
        let ((), version) = self
            .modify(name, tenant, |role| role.add_tags(tags))
            .await?;
        Ok(version)
    }

    /// Removes every tag whose key is listed.
    pub async fn untag_role(
        &self,
        name: &str,
        tenant: &Tenant,
        tag_keys: &[String],
    ) -> AppResult<ObjVersion> {
        let ((), version) = self
            .modify(name, tenant, |role| {
                role.erase_tags(tag_keys);
                Ok(())
            })
            .await?;
        Ok(version)
    }

    /// Returns the role's tags.
    pub async fn list_role_tags(&self, name: &str, tenant: &Tenant) -> AppResult<Vec<RoleTag>> {
        let stored = self.get_role(name, tenant).await?;
        Ok(stored
            .value
            .info
            .get_tags()
            .map(<[RoleTag]>::to_vec)
            .unwrap_or_default())
    }
}
