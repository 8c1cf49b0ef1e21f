//! Frame-accurate vehicle state
//!
//! Joins the world-tick snapshot (poses at the bundle's frame) with the live
//! vehicle list (archetype and bounding box).

use contracts::{
    ActorId, CameraView, ContractError, ImageData, VehicleSnapshot, VehicleSnapshotIndex,
    WorldSnapshot,
};
use tracing::debug;

/// Vehicle index at the snapshot's frame
///
/// Vehicles absent from the snapshot are skipped; pose and velocity always
/// come from the snapshot.
pub fn build_snapshot_index(
    snapshot: &WorldSnapshot,
    vehicles: &[VehicleSnapshot],
) -> VehicleSnapshotIndex {
    let mut index = VehicleSnapshotIndex::new(snapshot.frame);
    let mut skipped = 0usize;
    for vehicle in vehicles {
        match snapshot.find(vehicle.id) {
            Some(actor) => index.insert(VehicleSnapshot {
                transform: actor.transform,
                velocity: actor.velocity,
                ..vehicle.clone()
            }),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(frame = snapshot.frame, skipped, "vehicles missing from world snapshot");
    }
    index
}

/// Camera pose at the snapshot's frame, sized from the delivered image
pub fn camera_view(
    snapshot: &WorldSnapshot,
    camera_id: ActorId,
    parent_id: Option<ActorId>,
    image: &ImageData,
) -> Result<CameraView, ContractError> {
    let actor = snapshot
        .find(camera_id)
        .ok_or(ContractError::ActorNotFound { actor_id: camera_id })?;
    Ok(CameraView {
        actor_id: camera_id,
        parent_id,
        transform: actor.transform,
        width: image.width,
        height: image.height,
        fov: image.fov,
    })
}
