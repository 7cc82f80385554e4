//! Profile commands. Both require sign-in.

use clap::Subcommand;
use takeout_storefront::backend::ProfileUpdate;
use takeout_storefront::error::AppError;

use super::Context;
use crate::output;

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Show your profile
    Show,
    /// Change profile fields; an empty value clears a field
    Update {
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        phone: Option<String>,
        /// Default delivery address
        #[arg(short, long)]
        address: Option<String>,
    },
}

pub async fn run(action: ProfileAction, context: &Context) -> Result<(), AppError> {
    let signed_in = context.require_sign_in().await?;
    let user_id = &signed_in.session.user_id;

    let profile = match action {
        ProfileAction::Show => signed_in.client.get_profile(user_id).await?,
        ProfileAction::Update {
            name,
            phone,
            address,
        } => {
            let update = ProfileUpdate {
                full_name: name,
                phone,
                address,
            };
            if update.is_empty() {
                return Err(AppError::BadRequest(
                    "pass at least one of --name, --phone, --address".to_string(),
                ));
            }
            signed_in.client.update_profile(user_id, &update).await?
        }
    };
    println!("{}", output::profile(&profile));
    Ok(())
}
