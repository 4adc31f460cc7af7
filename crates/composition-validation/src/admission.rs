//! Turns validation results into admission decisions, for use in a validating
//! webhook for Compositions.
use kube::core::{
    DynamicObject,
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
};
use tracing::{debug, info};

use crate::{crd::Composition, lookup::SchemaLookup, validator::CompositionValidator};

/// Reviews `request` using the default [`CompositionValidator`].
pub fn review(
    request: &AdmissionRequest<Composition>,
    schemas: &impl SchemaLookup,
) -> AdmissionResponse {
    review_with(&CompositionValidator::default(), request, schemas)
}

/// Admits the Composition of `request` if `validator` finds no problems,
/// and denies it with all problems otherwise.
///
/// Requests without an object, like deletions, are always admitted.
pub fn review_with(
    validator: &CompositionValidator,
    request: &AdmissionRequest<Composition>,
    schemas: &impl SchemaLookup,
) -> AdmissionResponse {
    let response = AdmissionResponse::from(request);

    let Some(composition) = &request.object else {
        debug!(operation = ?request.operation, "request has no object, admitting");
        return response;
    };

    match validator.validate(composition, schemas) {
        Ok(()) => response,
        Err(errors) => {
            info!(
                k8s.composition.name = %request.name,
                errors = errors.len(),
                "denying invalid composition"
            );
            response.deny(errors.to_string())
        }
    }
}

/// Reviews a whole [`AdmissionReview`] as received by a webhook server.
pub fn handle_review(
    validator: &CompositionValidator,
    review: AdmissionReview<Composition>,
    schemas: &impl SchemaLookup,
) -> AdmissionReview<DynamicObject> {
    let request: AdmissionRequest<Composition> = match review.try_into() {
        Ok(request) => request,
        Err(err) => {
            return AdmissionResponse::invalid(format!("failed to convert to request: {err}"))
                .into_review();
        }
    };

    review_with(validator, &request, schemas).into_review()
}
